//! Example: a tiny foreign event context driven by the bundled reactor.
//!
//! Two producer threads write lines into pipes. The foreign context owns
//! one read source per pipe plus a heartbeat deadline, and only ever runs
//! through the bridge. The loop stops once every producer hung up.
//!
//! ```sh
//! RUST_LOG=confluence=debug cargo run -p confluence --example pipe_sources
//! ```

use confluence::context::{ForeignContext, IoCondition, PollFd, Prepared};
use confluence::reactor::StopHandle;
use confluence::{Bridge, Reactor};

use tracing::info;
use tracing_subscriber::EnvFilter;

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, FromRawFd};
use std::thread;
use std::time::{Duration, Instant};

const HEARTBEAT: Duration = Duration::from_millis(250);

fn pipe() -> io::Result<(File, File)> {
    let mut fds = [0; 2];
    if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC | libc::O_NONBLOCK) } != 0 {
        return Err(io::Error::last_os_error());
    }

    // Blocking writes for the producers.
    unsafe { libc::fcntl(fds[1], libc::F_SETFL, 0) };

    Ok(unsafe { (File::from_raw_fd(fds[0]), File::from_raw_fd(fds[1])) })
}

struct Source {
    name: &'static str,
    pipe: File,
}

struct Demo {
    sources: Vec<Source>,
    ready: Vec<PollFd>,
    next_beat: Instant,
    stop: StopHandle,
}

impl Demo {
    fn drain(source: &mut Source) {
        let mut buf = [0u8; 256];

        loop {
            match source.pipe.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    for line in String::from_utf8_lossy(&buf[..n]).lines() {
                        info!(source = source.name, "{line}");
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    info!(source = source.name, error = %e, "read failed");
                    break;
                }
            }
        }
    }
}

impl ForeignContext for Demo {
    fn prepare(&mut self) -> Prepared {
        Prepared {
            priority: 0,
            timeout: Some(self.next_beat.saturating_duration_since(Instant::now())),
        }
    }

    fn query(&mut self, _priority: i32, fds: &mut [PollFd]) -> usize {
        for (slot, source) in fds.iter_mut().zip(&self.sources) {
            *slot = PollFd::new(source.pipe.as_raw_fd(), IoCondition::IN);
        }

        self.sources.len()
    }

    fn check(&mut self, _priority: i32, fds: &[PollFd]) -> bool {
        self.ready = fds.iter().filter(|p| !p.revents.is_empty()).copied().collect();

        !self.ready.is_empty() || Instant::now() >= self.next_beat
    }

    fn dispatch(&mut self) {
        if Instant::now() >= self.next_beat {
            info!(sources = self.sources.len(), "heartbeat");
            self.next_beat = Instant::now() + HEARTBEAT;
        }

        for entry in std::mem::take(&mut self.ready) {
            let Some(index) = self
                .sources
                .iter()
                .position(|s| s.pipe.as_raw_fd() == entry.fd)
            else {
                continue;
            };

            Demo::drain(&mut self.sources[index]);

            if entry.revents.intersects(IoCondition::HUP | IoCondition::ERR) {
                let source = self.sources.remove(index);
                info!(source = source.name, "producer hung up");
            }
        }

        if self.sources.is_empty() {
            self.stop.stop();
        }
    }
}

fn produce(name: &'static str, mut pipe: File, count: usize, every: Duration) {
    thread::spawn(move || {
        for i in 0..count {
            thread::sleep(every);
            if writeln!(pipe, "{name} message {i}").is_err() {
                return;
            }
        }
    });
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut reactor = Reactor::new()?;

    let (fast_rx, fast_tx) = pipe()?;
    let (slow_rx, slow_tx) = pipe()?;
    produce("fast", fast_tx, 8, Duration::from_millis(60));
    produce("slow", slow_tx, 3, Duration::from_millis(300));

    let mut bridge = Bridge::new(Demo {
        sources: vec![
            Source {
                name: "fast",
                pipe: fast_rx,
            },
            Source {
                name: "slow",
                pipe: slow_rx,
            },
        ],
        ready: Vec::new(),
        next_beat: Instant::now() + HEARTBEAT,
        stop: reactor.stop_handle(),
    });

    bridge.initialize(&mut reactor)?;
    reactor.run()?;
    bridge.teardown(&mut reactor);

    info!("all producers done");
    Ok(())
}
