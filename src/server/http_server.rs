use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};

use super::service::AppService;
use crate::worker::WorkerGroup;

/// Fixed pool of threads pulling requests off one `tiny_http` listener
#[derive(Debug)]
pub struct HttpServer {
    service: AppService,
    threads: usize,
}

/// Stops a running server from any thread
///
/// Obtained from [`ServerHandle::shutdown_trigger`]; typically moved into a
/// signal-handling thread while the main thread sits in
/// [`ServerHandle::join`].
#[derive(Clone)]
pub struct ShutdownTrigger {
    server: Arc<tiny_http::Server>,
    running: Arc<AtomicBool>,
    threads: usize,
}

impl ShutdownTrigger {
    /// Returns false if shutdown was already under way
    pub fn trigger(&self) -> bool {
        if !self.running.swap(false, Ordering::AcqRel) {
            return false;
        }
        // One wake-up per blocked receiver
        for _ in 0..self.threads {
            self.server.unblock();
        }
        true
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for ShutdownTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownTrigger")
            .field("running", &self.is_running())
            .field("threads", &self.threads)
            .finish()
    }
}

/// Handle to a running HTTP server
///
/// Owns the server threads and the background workers started alongside
/// them. Dropping the handle stops both.
#[derive(Debug)]
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: ShutdownTrigger,
    threads: Vec<JoinHandle<()>>,
    workers: WorkerGroup,
}

impl ServerHandle {
    /// Address actually bound (useful with port `0`)
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Wait for the server to be ready to accept connections
    ///
    /// # Errors
    ///
    /// Returns `TimedOut` error if the server doesn't become ready within ~250ms (50 attempts × 5ms).
    pub fn wait_ready(&self) -> io::Result<()> {
        for _ in 0..50 {
            if TcpStream::connect(self.addr).is_ok() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(5));
        }
        Err(io::Error::new(io::ErrorKind::TimedOut, "server not ready"))
    }

    #[must_use]
    pub fn shutdown_trigger(&self) -> ShutdownTrigger {
        self.shutdown.clone()
    }

    pub(crate) fn with_workers(mut self, workers: WorkerGroup) -> Self {
        self.workers = workers;
        self
    }

    /// Stop accepting requests, wait for in-flight ones, then stop workers
    pub fn stop(mut self) {
        self.shutdown.trigger();
        self.finish();
    }

    /// Block until the server is stopped through a [`ShutdownTrigger`]
    ///
    /// # Errors
    ///
    /// Returns an error if a server thread panicked.
    pub fn join(mut self) -> thread::Result<()> {
        let mut result = Ok(());
        for handle in std::mem::take(&mut self.threads) {
            if let Err(panic) = handle.join() {
                result = Err(panic);
            }
        }
        self.finish();
        result
    }

    fn finish(&mut self) {
        for handle in std::mem::take(&mut self.threads) {
            if handle.join().is_err() {
                error!("Server thread panicked");
            }
        }
        self.workers.stop_all();
        info!(addr = %self.addr, "Server stopped");
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if self.shutdown.trigger() {
            self.finish();
        }
    }
}

impl HttpServer {
    pub fn new(service: AppService, threads: usize) -> Self {
        Self {
            service,
            threads: threads.max(1),
        }
    }

    /// Bind `addr` and start serving
    ///
    /// # Errors
    ///
    /// Returns an error if the address can't be bound or a thread can't be
    /// spawned.
    pub fn start<A: ToSocketAddrs>(self, addr: A) -> io::Result<ServerHandle> {
        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid address"))?;
        let server = tiny_http::Server::http(addr).map_err(io::Error::other)?;
        let bound = server.server_addr().to_ip().unwrap_or(addr);
        let server = Arc::new(server);

        let shutdown = ShutdownTrigger {
            server: Arc::clone(&server),
            running: Arc::new(AtomicBool::new(true)),
            threads: self.threads,
        };

        let mut handle = ServerHandle {
            addr: bound,
            shutdown: shutdown.clone(),
            threads: Vec::with_capacity(self.threads),
            workers: WorkerGroup::default(),
        };

        for i in 0..self.threads {
            let server = Arc::clone(&server);
            let running = Arc::clone(&shutdown.running);
            let service = self.service.clone();
            // On failure, dropping `handle` unblocks and joins what was spawned
            let t = thread::Builder::new()
                .name(format!("strata-http-{i}"))
                .spawn(move || serve_loop(&server, &running, &service))?;
            handle.threads.push(t);
        }

        info!(addr = %bound, threads = self.threads, "Server listening");
        Ok(handle)
    }
}

fn serve_loop(server: &tiny_http::Server, running: &AtomicBool, service: &AppService) {
    while running.load(Ordering::Acquire) {
        match server.recv() {
            Ok(rq) => service.serve(rq),
            Err(e) => {
                if !running.load(Ordering::Acquire) {
                    break;
                }
                error!(error = %e, "Failed to receive request");
            }
        }
    }
    debug!(thread = ?thread::current().name(), "Server thread exiting");
}
