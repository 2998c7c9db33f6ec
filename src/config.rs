//! Configuration for the cookie baker worker

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Largest payload a single UDP datagram can carry over IPv4.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Address the receive socket binds to.
    pub bind_host: IpAddr,
    /// Port the host sends job-control messages to.
    pub input_port: u16,
    /// Address of the host process.
    pub remote_host: IpAddr,
    /// Port the host listens on for progress and completion messages.
    pub output_port: u16,
    /// Pause between transport passes.
    pub poll_interval: Duration,
    /// Pause between scheduler ticks while no job is running.
    pub idle_tick_interval: Duration,
    /// Number of scheduler ticks between forced reclamation passes.
    pub reclaim_interval: u32,
    /// Capacity of each of the two transport queues.
    pub queue_capacity: usize,
    pub max_datagram_size: usize,
    /// Seed for the per-job jitter stream.
    pub seed: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            bind_host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            input_port: 0,
            remote_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            output_port: 0,
            poll_interval: Duration::from_millis(3),
            idle_tick_interval: Duration::from_millis(16),
            reclaim_interval: 10,
            queue_capacity: 1024,
            max_datagram_size: MAX_DATAGRAM_SIZE,
            seed: 0,
        }
    }
}

impl WorkerConfig {
    pub fn new(input_port: u16, output_port: u16) -> Self {
        Self {
            input_port,
            output_port,
            ..Self::default()
        }
    }

    pub fn bind_host(mut self, host: IpAddr) -> Self {
        self.bind_host = host;
        self
    }

    pub fn remote_host(mut self, host: IpAddr) -> Self {
        self.remote_host = host;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn idle_tick_interval(mut self, interval: Duration) -> Self {
        self.idle_tick_interval = interval;
        self
    }

    pub fn reclaim_interval(mut self, ticks: u32) -> Self {
        self.reclaim_interval = ticks.max(1);
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn max_datagram_size(mut self, size: usize) -> Self {
        self.max_datagram_size = size;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_host, self.input_port)
    }

    pub fn remote_addr(&self) -> SocketAddr {
        SocketAddr::new(self.remote_host, self.output_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_worker_cadence() {
        let config = WorkerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(3));
        assert_eq!(config.reclaim_interval, 10);
        assert_eq!(config.seed, 0);
        assert_eq!(config.remote_host, IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn test_builder_addresses() {
        let config = WorkerConfig::new(4000, 4001).reclaim_interval(0);
        assert_eq!(config.listen_addr().port(), 4000);
        assert_eq!(config.remote_addr(), "127.0.0.1:4001".parse().unwrap());
        assert_eq!(config.reclaim_interval, 1);
    }
}
