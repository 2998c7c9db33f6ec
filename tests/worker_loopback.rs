use cookie_baker::math::Vec3;
use cookie_baker::protocol::{self, Bounds, Message, ObjectDatum, ProgressUpdate, WorkloadRequest};
use cookie_baker::{FinishedBake, Worker, WorkerConfig};
use crossbeam_channel::unbounded;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Duration;

fn free_port() -> u16 {
    UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// One triangle at z = 2 in front of a light at the origin; only pixel (1, 1)
/// of the 2x2 cookie sees past it on a centred pass.
fn partial_blocker_request(workload_id: i32) -> WorkloadRequest {
    WorkloadRequest {
        workload_id,
        sample_count: 1,
        min_range: 0.0,
        max_range: 100.0,
        shadow_focus_plane: 1.0,
        resolution: 2,
        bounce_count: 1,
        light_position: Vec3::ZERO,
        light_forward: Vec3::Z,
        light_upward: Vec3::Y,
        light_theta_rad: std::f32::consts::FRAC_PI_4,
        vertices: vec![
            Vec3::new(-5.0, -5.0, 2.0),
            Vec3::new(-5.0, 6.0, 2.0),
            Vec3::new(6.0, -5.0, 2.0),
        ],
        indices: vec![0, 1, 2],
        object_data: vec![ObjectDatum {
            indices_count: 3,
            bounds: Bounds {
                center: Vec3::new(0.5, 0.5, 2.0),
                extent: Vec3::new(5.5, 5.5, 0.0),
            },
            ..ObjectDatum::default()
        }],
    }
}

struct Host {
    socket: UdpSocket,
    worker: SocketAddr,
}

impl Host {
    fn send(&self, message: &Message) {
        self.socket
            .send_to(&protocol::encode(message), self.worker)
            .unwrap();
    }

    fn recv(&self) -> Message {
        let mut buffer = vec![0; 4096];
        let (len, _) = self.socket.recv_from(&mut buffer).unwrap();
        protocol::decode(&buffer[..len]).unwrap()
    }
}

#[test]
fn test_bake_over_loopback() {
    let _ = env_logger::builder().is_test(true).try_init();

    let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    socket.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let input_port = free_port();
    let config = WorkerConfig::new(input_port, socket.local_addr().unwrap().port())
        .bind_host(IpAddr::V4(Ipv4Addr::LOCALHOST));
    let host = Host {
        socket,
        worker: SocketAddr::from((Ipv4Addr::LOCALHOST, input_port)),
    };

    let (finished_tx, finished_rx) = unbounded::<FinishedBake>();
    let mut worker = Worker::new(config);
    worker.set_finished_callback(move |bake| {
        let _ = finished_tx.send(bake);
    });
    let thread = std::thread::spawn(move || worker.run());

    assert_eq!(host.recv(), Message::UpAndRunning);

    host.send(&Message::WorkloadRequest(partial_blocker_request(42)));
    assert_eq!(host.recv(), Message::WorkloadReceived { workload_id: 42 });
    assert_eq!(
        host.recv(),
        Message::ProgressUpdate(ProgressUpdate {
            workload_id: 42,
            completed_samples: 0,
            total_samples: 1,
            currently_running: true,
        })
    );
    assert_eq!(
        host.recv(),
        Message::ProgressUpdate(ProgressUpdate {
            workload_id: 42,
            completed_samples: 1,
            total_samples: 1,
            currently_running: true,
        })
    );
    assert_eq!(host.recv(), Message::WorkloadComplete { workload_id: 42 });

    let bake = finished_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(bake.workload_id, 42);
    assert_eq!(bake.image.resolution(), 2);
    let lit = bake
        .image
        .pixels()
        .iter()
        .filter(|p| p.truncate() != Vec3::ZERO)
        .count();
    assert_eq!(lit, 1);

    host.send(&Message::ShutdownMessage);
    thread.join().unwrap().unwrap();
}

#[test]
fn test_cancel_and_shutdown_over_loopback() {
    let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    socket.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let input_port = free_port();
    let config = WorkerConfig::new(input_port, socket.local_addr().unwrap().port())
        .bind_host(IpAddr::V4(Ipv4Addr::LOCALHOST));
    let host = Host {
        socket,
        worker: SocketAddr::from((Ipv4Addr::LOCALHOST, input_port)),
    };

    let mut worker = Worker::new(config);
    let thread = std::thread::spawn(move || worker.run());
    assert_eq!(host.recv(), Message::UpAndRunning);

    let mut request = partial_blocker_request(7);
    request.sample_count = 1_000_000;
    host.send(&Message::WorkloadRequest(request));
    assert_eq!(host.recv(), Message::WorkloadReceived { workload_id: 7 });

    host.send(&Message::CancelWorkload { workload_id: 7 });
    host.send(&Message::ShutdownMessage);

    thread.join().unwrap().unwrap();

    // Nothing after the drain may claim the job finished.
    host.socket
        .set_read_timeout(Some(Duration::from_millis(100)))
        .unwrap();
    let mut buffer = vec![0; 4096];
    while let Ok((len, _)) = host.socket.recv_from(&mut buffer) {
        let message = protocol::decode(&buffer[..len]).unwrap();
        assert_ne!(message, Message::WorkloadComplete { workload_id: 7 });
    }
}
