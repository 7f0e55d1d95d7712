use std::{
    fmt::Write as _,
    sync::Mutex,
    thread,
    time::Duration,
};

use chrono::{DateTime, Local};
use crossbeam_channel::{bounded, unbounded, Sender};
use once_cell::sync::Lazy;

use crate::logging::rotate::Rotate;

pub mod rotate;

static LOGGER: Lazy<Logger> = Lazy::new(|| Logger::new("momentum"));

/// Writer of every logger created so far, flushed together by `flush()`.
static WRITERS: Lazy<Mutex<Vec<Sender<Command>>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// How long `flush` waits for the writer thread.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

enum Command {
    Write(LogMessage),
    Flush(Sender<()>),
}

pub struct Logger {
    writer: Sender<Command>,
    /// echo info, warn and error lines to stdout
    console: bool,
}

impl Logger {
    pub fn new(log_name: &str) -> Self {
        Self::with_console(log_name, log_name == "momentum")
    }

    fn with_console(log_name: &str, console: bool) -> Self {
        let (tx, rx) = unbounded::<Command>();
        let fn_pattern = format!("log/%Y-%m-%d-{}.log", log_name);

        // 寫入檔案的操作使用另一個線程處理
        thread::spawn(move || {
            let mut rotate = Rotate::new(fn_pattern);
            let mut line = String::with_capacity(4096);

            for command in &rx {
                match command {
                    Command::Write(received) => {
                        if writeln!(
                            &mut line,
                            "{} {} {}",
                            received.created_at.format("%F %X%.6f"),
                            received.level,
                            received.msg
                        )
                        .is_err()
                        {
                            continue;
                        }

                        if rx.is_empty() || line.len() >= 4096 {
                            Self::write_out(&mut rotate, &mut line);
                        }
                    }
                    Command::Flush(ack) => {
                        Self::write_out(&mut rotate, &mut line);
                        rotate.flush();
                        let _ = ack.send(());
                    }
                }
            }
        });

        if let Ok(mut writers) = WRITERS.lock() {
            writers.push(tx.clone());
        }

        Logger {
            writer: tx,
            console,
        }
    }

    fn write_out(rotate: &mut Rotate, line: &mut String) {
        if line.is_empty() {
            return;
        }

        if let Err(why) = rotate.write_msg(Local::now(), line.as_bytes()) {
            error_console(format!("Failed to write to log file because {:?}", why));
            info_console(line.clone());
        }

        line.clear();
    }

    pub fn info(&self, log: String) {
        self.send(log::Level::Info, log);
    }

    pub fn warn(&self, log: String) {
        self.send(log::Level::Warn, log);
    }

    pub fn error(&self, log: String) {
        self.send(log::Level::Error, log);
    }

    pub fn debug(&self, log: String) {
        self.send(log::Level::Debug, log);
    }

    fn send(&self, level: log::Level, msg: String) {
        if self.console && level <= log::Level::Info {
            println!(
                "{} {} {}",
                Local::now().format("%Y-%m-%d %H:%M:%S.%3f"),
                level,
                msg
            );
        }

        if let Err(why) = self.writer.send(Command::Write(LogMessage::new(level, msg))) {
            error_console(why.to_string());
        }
    }

    /// Blocks until every line queued so far is on disk.
    pub fn flush(&self) {
        flush_writer(&self.writer);
    }
}

fn flush_writer(writer: &Sender<Command>) {
    let (ack_tx, ack_rx) = bounded::<()>(1);
    if writer.send(Command::Flush(ack_tx)).is_err() {
        return;
    }

    if ack_rx.recv_timeout(FLUSH_TIMEOUT).is_err() {
        error_console("Timed out while flushing the log file".to_string());
    }
}

pub struct LogMessage {
    pub level: log::Level,
    pub msg: String,
    pub created_at: DateTime<Local>,
}

impl LogMessage {
    pub fn new(level: log::Level, msg: String) -> Self {
        LogMessage {
            level,
            msg,
            created_at: Local::now(),
        }
    }
}

pub fn info_file_async(log: impl Into<String>) {
    LOGGER.info(log.into());
}

pub fn warn_file_async(log: impl Into<String>) {
    LOGGER.warn(log.into());
}

pub fn error_file_async(log: impl Into<String>) {
    LOGGER.error(log.into());
}

pub fn debug_file_async(log: impl Into<String>) {
    LOGGER.debug(log.into());
}

/// Writes everything still queued by every logger, e.g. the `http` one.
pub fn flush() {
    let writers = match WRITERS.lock() {
        Ok(writers) => writers.clone(),
        Err(why) => {
            error_console(format!("Failed to lock the log writers because {:?}", why));
            return;
        }
    };

    for writer in &writers {
        flush_writer(writer);
    }
}

pub fn info_console(log: String) {
    println!(
        "{} Info {}",
        Local::now().format("%Y-%m-%d %H:%M:%S.%3f"),
        log
    );
}

pub fn error_console(log: String) {
    eprintln!(
        "{} Error {}",
        Local::now().format("%Y-%m-%d %H:%M:%S.%3f"),
        log
    );
}
