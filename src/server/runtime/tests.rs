use std::{
    io,
    net::{Ipv4Addr, SocketAddr},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use rstest::rstest;
use tokio::{
    net::TcpStream,
    sync::oneshot,
    time::Instant,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{accept::AcceptListener, *};
use crate::{
    app::DdpApp,
    server::{DEFAULT_UPGRADE_TIMEOUT, DdpServer},
    session::SessionRegistry,
};

#[rstest]
#[case(Duration::ZERO, Duration::ZERO, Duration::from_millis(1), Duration::from_millis(1))]
#[case(
    Duration::from_millis(500),
    Duration::from_millis(20),
    Duration::from_millis(20),
    Duration::from_millis(500)
)]
#[case(
    Duration::from_millis(10),
    Duration::from_secs(1),
    Duration::from_millis(10),
    Duration::from_secs(1)
)]
fn backoff_is_normalized(
    #[case] initial: Duration,
    #[case] max: Duration,
    #[case] want_initial: Duration,
    #[case] want_max: Duration,
) {
    let cfg = BackoffConfig {
        initial_delay: initial,
        max_delay: max,
    }
    .normalized();
    assert_eq!(cfg.initial_delay, want_initial);
    assert_eq!(cfg.max_delay, want_max);
}

#[test]
fn backoff_doubles_up_to_max() {
    let cfg = BackoffConfig {
        initial_delay: Duration::from_millis(300),
        max_delay: Duration::from_secs(1),
    };
    assert_eq!(cfg.next_delay(Duration::from_millis(300)), Duration::from_millis(600));
    assert_eq!(cfg.next_delay(Duration::from_millis(600)), Duration::from_secs(1));
    assert_eq!(cfg.next_delay(Duration::from_secs(1)), Duration::from_secs(1));
}

/// Fails `accept()` a fixed number of times, then never yields.
struct FailingListener {
    failures: Mutex<usize>,
    calls: Mutex<Vec<Instant>>,
}

#[async_trait]
impl AcceptListener for FailingListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        self.calls.lock().expect("lock").push(Instant::now());
        let fail = {
            let mut left = self.failures.lock().expect("lock");
            let fail = *left > 0;
            *left = left.saturating_sub(1);
            fail
        };
        if fail {
            return Err(io::Error::other("accept failed"));
        }
        std::future::pending().await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> { Ok(SocketAddr::from((Ipv4Addr::LOCALHOST, 0))) }
}

#[tokio::test(start_paused = true)]
async fn accept_errors_back_off_exponentially() {
    let listener = Arc::new(FailingListener {
        failures: Mutex::new(4),
        calls: Mutex::new(Vec::new()),
    });
    let (state, notifier) = DdpApp::new().into_parts();
    let (registry, _task) = SessionRegistry::spawn(notifier);
    let shutdown = CancellationToken::new();
    let tracker = TaskTracker::new();
    let task = tokio::spawn(accept_loop(
        Arc::clone(&listener),
        AcceptLoopOptions {
            deps: ConnectionDeps {
                app: state,
                registry,
                upgrade_timeout: DEFAULT_UPGRADE_TIMEOUT,
            },
            shutdown: shutdown.clone(),
            tracker,
            backoff: BackoffConfig {
                initial_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(25),
            },
        },
    ));

    tokio::time::sleep(Duration::from_secs(1)).await;
    shutdown.cancel();
    task.await.expect("accept loop");

    let calls = listener.calls.lock().expect("lock");
    let gaps: Vec<Duration> = calls.windows(2).map(|w| w[1] - w[0]).collect();
    assert_eq!(
        gaps,
        vec![
            Duration::from_millis(10),
            Duration::from_millis(20),
            Duration::from_millis(25),
            Duration::from_millis(25),
        ]
    );
}

#[tokio::test]
async fn ready_signal_fires_and_shutdown_completes() {
    let (ready_tx, ready_rx) = oneshot::channel();
    let server = DdpServer::new(DdpApp::new())
        .ready_signal(ready_tx)
        .bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))
        .expect("bind");
    assert!(server.local_addr().is_some());

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(server.run_with_shutdown(async {
        let _ = stop_rx.await;
    }));
    ready_rx.await.expect("server ready");
    let _ = stop_tx.send(());
    handle
        .await
        .expect("server task")
        .expect("clean shutdown");
}

#[tokio::test]
async fn registry_handle_is_live_while_running() {
    let server = DdpServer::new(DdpApp::new())
        .bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))
        .expect("bind");
    let registry = server.registry();
    let shutdown = CancellationToken::new();
    let stop = shutdown.clone();
    let handle = tokio::spawn(server.run_with_shutdown(async move { stop.cancelled().await }));

    assert_eq!(registry.session_count().await, Some(0));
    shutdown.cancel();
    handle
        .await
        .expect("server task")
        .expect("clean shutdown");
    assert_eq!(registry.session_count().await, None);
}

#[tokio::test]
async fn failed_upgrade_is_dropped_quietly() {
    use tokio::io::AsyncWriteExt;

    let server = DdpServer::new(DdpApp::new())
        .upgrade_timeout(Duration::from_millis(200))
        .bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))
        .expect("bind");
    let addr = server.local_addr().expect("bound address");
    let registry = server.registry();
    let shutdown = CancellationToken::new();
    let stop = shutdown.clone();
    let handle = tokio::spawn(server.run_with_shutdown(async move { stop.cancelled().await }));

    let mut stream = TcpStream::connect(addr).await.expect("connect");
    stream
        .write_all(b"GET / HTTP/1.0\r\n\r\n")
        .await
        .expect("write garbage request");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(registry.session_count().await, Some(0));

    shutdown.cancel();
    handle
        .await
        .expect("server task")
        .expect("clean shutdown");
}
