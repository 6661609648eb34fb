//! Log streaming
//!
//! Tails a job's output files over the transport and relays new lines to the
//! caller. Each file has a byte cursor, so every poll only transfers what was
//! appended since the previous one. Lines flow through a bounded channel; a
//! slow consumer therefore slows polling down instead of growing a buffer.
//!
//! Streaming is purely an observer. Cancelling it, dropping the stream or
//! losing the connection stops local relaying and nothing else: the job keeps
//! running under the workload manager.

use async_trait::async_trait;
use slurmssh_core::shell;
use slurmssh_core::{JobHandle, JobState, LogLine, LogSource, RemoteLayout, StreamOptions};
use std::ops::ControlFlow;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, warn};

use crate::error::{ClientError, Result};
use crate::status;
use crate::transport::{ChunkSink, Transport};

/// Item produced by a [`LogStream`]
#[derive(Debug, Clone)]
pub enum LogEvent {
    /// A complete line of job output
    Line(LogLine),
    /// The job reached a terminal state and all of its output was relayed
    Finished(JobState),
}

/// Lazy sequence of job output
///
/// Ends after [`LogEvent::Finished`], after a single `Err` carrying
/// [`ClientError::Stream`], or when cancelled. Dropping it cancels polling.
pub struct LogStream {
    inner: ReceiverStream<Result<LogEvent>>,
    _guard: DropGuard,
}

impl Stream for LogStream {
    type Item = Result<LogEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Polls a job's log files on a fixed interval
pub struct LogStreamer {
    transport: Arc<dyn Transport>,
    layout: RemoteLayout,
    options: StreamOptions,
}

/// Outcome of one successful poll round
enum Round {
    /// Reads done; carries the job state when it was queried this round
    Completed(Option<JobState>),
    /// Nobody is listening any more
    Detached,
}

impl LogStreamer {
    pub fn new(
        transport: Arc<dyn Transport>,
        layout: RemoteLayout,
        options: StreamOptions,
    ) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            transport,
            layout,
            options,
        })
    }

    /// Starts polling in a background task
    ///
    /// Cancelling `cancel` (or dropping the returned stream) stops the task at
    /// the next round boundary; no remote command is issued afterwards.
    pub fn spawn(self, handle: JobHandle, cancel: CancellationToken) -> LogStream {
        let cancel = cancel.child_token();
        let guard = cancel.clone().drop_guard();
        let (tx, rx) = mpsc::channel(self.options.channel_capacity);

        tokio::spawn(async move {
            self.run(handle, tx, cancel).await;
        });

        LogStream {
            inner: ReceiverStream::new(rx),
            _guard: guard,
        }
    }

    async fn run(
        self,
        handle: JobHandle,
        tx: mpsc::Sender<Result<LogEvent>>,
        cancel: CancellationToken,
    ) {
        let paths = self.layout.log_paths(&handle.remote_root, &handle.job_id);
        let mut cursors = vec![LogCursor::new(LogSource::Stdout, paths.stdout)];
        if let Some(stderr) = paths.stderr {
            cursors.push(LogCursor::new(LogSource::Stderr, stderr));
        }

        info!(
            "Streaming output of job {} from {} (interval: {:?})",
            handle.job_id, handle.target, self.options.poll_interval
        );

        let status_every = u64::from(self.options.status_every);
        let mut round: u64 = 0;
        let mut failures: u32 = 0;
        let mut final_state: Option<JobState> = None;

        loop {
            if cancel.is_cancelled() || tx.is_closed() {
                debug!("Stopped streaming job {}", handle.job_id);
                return;
            }

            let check_status = final_state.is_none() && round % status_every == 0;
            round += 1;

            match self.poll_round(&handle, &mut cursors, &tx, check_status).await {
                Ok(Round::Detached) => {
                    debug!("Consumer of job {} output went away", handle.job_id);
                    return;
                }
                Ok(Round::Completed(state)) => {
                    failures = 0;

                    if let Some(state) = final_state.take() {
                        for cursor in &mut cursors {
                            if cursor.flush(&tx).await.is_break() {
                                return;
                            }
                        }
                        info!("Job {} finished with state {}", handle.job_id, state);
                        let _ = tx.send(Ok(LogEvent::Finished(state))).await;
                        return;
                    }

                    if let Some(state) = state.filter(JobState::is_terminal) {
                        debug!(
                            "Job {} reached {}, reading remaining output",
                            handle.job_id, state
                        );
                        final_state = Some(state);
                        continue;
                    }
                }
                Err(e) => {
                    failures += 1;
                    warn!(
                        "Poll for job {} failed ({}/{}): {}",
                        handle.job_id, failures, self.options.max_consecutive_failures, e
                    );

                    if failures >= self.options.max_consecutive_failures {
                        error!(
                            "Giving up on output of job {}; the job itself is unaffected",
                            handle.job_id
                        );
                        let _ = tx
                            .send(Err(ClientError::Stream {
                                failures,
                                last_error: e.to_string(),
                            }))
                            .await;
                        return;
                    }
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Stopped streaming job {}", handle.job_id);
                    return;
                }
                _ = tokio::time::sleep(self.options.poll_interval) => {}
            }
        }
    }

    /// Reads every log file once, then optionally queries the job state
    ///
    /// Commands run one after another; the first failure ends the round.
    async fn poll_round(
        &self,
        handle: &JobHandle,
        cursors: &mut [LogCursor],
        tx: &mpsc::Sender<Result<LogEvent>>,
        check_status: bool,
    ) -> Result<Round> {
        for cursor in cursors.iter_mut() {
            let read = self.read_log(handle, cursor, tx).await;
            match read {
                Err(e) if e.exit_code() == Some(TRUNCATED_EXIT_CODE) => {
                    warn!(
                        "{} shrank below {} bytes (job requeued?), reading it from the start",
                        cursor.path, cursor.offset
                    );
                    cursor.rewind();
                    self.read_log(handle, cursor, tx).await?;
                }
                result => {
                    result?;
                }
            }

            if tx.is_closed() {
                return Ok(Round::Detached);
            }
        }

        if !check_status {
            return Ok(Round::Completed(None));
        }

        let state =
            status::query_state(self.transport.as_ref(), &handle.target, &handle.job_id).await?;
        Ok(Round::Completed(Some(state)))
    }

    /// Relays whatever was appended to one log file since the last read
    async fn read_log(
        &self,
        handle: &JobHandle,
        cursor: &mut LogCursor,
        tx: &mpsc::Sender<Result<LogEvent>>,
    ) -> Result<u64> {
        let command = cursor.read_command();
        let mut relay = LineRelay { cursor, tx };
        self.transport
            .run_remote_streaming(&handle.target, &command, &mut relay)
            .await
    }
}

/// Exit status of a read command whose file shrank below the cursor
const TRUNCATED_EXIT_CODE: i32 = 86;

/// Read position within one remote log file
struct LogCursor {
    source: LogSource,
    path: String,
    /// Bytes of the file already received
    offset: u64,
    /// Received bytes after the last newline
    partial: Vec<u8>,
}

impl LogCursor {
    fn new(source: LogSource, path: String) -> Self {
        Self {
            source,
            path,
            offset: 0,
            partial: Vec::new(),
        }
    }

    /// Prints everything past `offset`, or nothing if the file does not exist yet
    ///
    /// Exits with [`TRUNCATED_EXIT_CODE`] when the file is now shorter than
    /// `offset`, which happens when Slurm requeues a job and recreates it.
    fn read_command(&self) -> String {
        let path = shell::quote_path(&self.path);
        if self.offset == 0 {
            return format!("if [ -f {path} ]; then tail -c +1 {path}; fi");
        }

        format!(
            "if [ -f {path} ]; then \
             if [ $(wc -c < {path}) -lt {offset} ]; then exit {code}; fi; \
             tail -c +{start} {path}; fi",
            offset = self.offset,
            code = TRUNCATED_EXIT_CODE,
            start = self.offset + 1,
        )
    }

    /// Starts over at the beginning of the file
    fn rewind(&mut self) {
        self.offset = 0;
        self.partial.clear();
    }

    /// Emits a trailing line that never got its newline
    async fn flush(&mut self, tx: &mpsc::Sender<Result<LogEvent>>) -> ControlFlow<()> {
        if self.partial.is_empty() {
            return ControlFlow::Continue(());
        }

        let bytes = std::mem::take(&mut self.partial);
        send_line(tx, self.source, &bytes).await
    }
}

/// Splits streamed bytes into lines for one cursor
struct LineRelay<'a> {
    cursor: &'a mut LogCursor,
    tx: &'a mpsc::Sender<Result<LogEvent>>,
}

#[async_trait]
impl ChunkSink for LineRelay<'_> {
    async fn write_chunk(&mut self, chunk: &[u8]) -> ControlFlow<()> {
        self.cursor.offset += chunk.len() as u64;
        self.cursor.partial.extend_from_slice(chunk);

        while let Some(pos) = self.cursor.partial.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.cursor.partial.drain(..=pos).collect();
            send_line(self.tx, self.cursor.source, &line[..pos]).await?;
        }

        ControlFlow::Continue(())
    }
}

async fn send_line(
    tx: &mpsc::Sender<Result<LogEvent>>,
    source: LogSource,
    bytes: &[u8],
) -> ControlFlow<()> {
    let text = String::from_utf8_lossy(bytes);
    let line = LogLine {
        source,
        text: text.trim_end_matches('\r').to_string(),
        received_at: chrono::Utc::now(),
    };

    match tx.send(Ok(LogEvent::Line(line))).await {
        Ok(()) => ControlFlow::Continue(()),
        Err(_) => ControlFlow::Break(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, FakeTransport, fail, ok, target};
    use std::time::Duration;
    use tokio_stream::StreamExt;

    const INTERVAL: Duration = Duration::from_millis(10);

    fn merged_layout() -> RemoteLayout {
        RemoteLayout::new("slurmssh", "slurm-{job_id}.out", None).unwrap()
    }

    fn handle() -> JobHandle {
        JobHandle::new("12345", target(), "~/slurmssh/demo")
    }

    fn options(max_failures: u32) -> StreamOptions {
        StreamOptions::default()
            .with_poll_interval(INTERVAL)
            .with_max_consecutive_failures(max_failures)
    }

    fn start(
        transport: Arc<FakeTransport>,
        layout: RemoteLayout,
        options: StreamOptions,
        cancel: CancellationToken,
    ) -> LogStream {
        LogStreamer::new(transport, layout, options)
            .unwrap()
            .spawn(handle(), cancel)
    }

    /// Byte offset requested by a `tail -c +N` command
    fn requested_offset(command: &str) -> Option<usize> {
        let rest = command.split("tail -c +").nth(1)?;
        let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
        digits.parse::<usize>().ok().map(|n| n - 1)
    }

    async fn collect(stream: LogStream) -> Vec<Result<LogEvent>> {
        tokio::time::timeout(Duration::from_secs(5), stream.collect::<Vec<_>>())
            .await
            .expect("stream should end")
    }

    fn lines(events: &[Result<LogEvent>]) -> Vec<String> {
        events
            .iter()
            .filter_map(|event| match event {
                Ok(LogEvent::Line(line)) => Some(line.text.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_read_command() {
        let path = "~/slurmssh/demo/slurm-7.out".to_string();
        let mut cursor = LogCursor::new(LogSource::Stdout, path);
        assert_eq!(
            cursor.read_command(),
            "if [ -f ~/slurmssh/demo/slurm-7.out ]; then tail -c +1 ~/slurmssh/demo/slurm-7.out; fi"
        );

        cursor.offset = 120;
        assert_eq!(
            cursor.read_command(),
            "if [ -f ~/slurmssh/demo/slurm-7.out ]; then \
             if [ $(wc -c < ~/slurmssh/demo/slurm-7.out) -lt 120 ]; then exit 86; fi; \
             tail -c +121 ~/slurmssh/demo/slurm-7.out; fi"
        );
    }

    #[tokio::test]
    async fn test_output_written_before_exit_is_read_after_terminal_state() {
        let mut completed = false;
        let mut served = false;
        let transport = FakeTransport::new(move |call| match call {
            Call::Remote(cmd) if cmd.contains("squeue") => {
                completed = true;
                ok("COMPLETED\n")
            }
            Call::Remote(cmd) if cmd.contains("tail") && completed && !served => {
                served = true;
                ok("late line\n")
            }
            _ => ok(""),
        });

        let stream = start(
            transport.clone(),
            merged_layout(),
            options(3),
            CancellationToken::new(),
        );
        let events = collect(stream).await;

        assert_eq!(events.len(), 2);
        match &events[0] {
            Ok(LogEvent::Line(line)) => assert_eq!(line.text, "late line"),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(matches!(
            events[1],
            Ok(LogEvent::Finished(JobState::Completed))
        ));

        let commands = transport.remote_commands();
        assert_eq!(commands.len(), 3);
        assert!(commands[1].contains("squeue"));
        assert!(commands[2].contains("tail"));
    }

    #[tokio::test]
    async fn test_truncated_log_is_read_from_the_start() {
        let mut tail_calls = 0;
        let mut status_calls = 0;
        let transport = FakeTransport::new(move |call| match call {
            Call::Remote(cmd) if cmd.contains("tail") => {
                tail_calls += 1;
                match tail_calls {
                    1 => ok("attempt 1\n"),
                    2 => fail(TRUNCATED_EXIT_CODE, ""),
                    3 => ok("attempt 2\n"),
                    _ => ok(""),
                }
            }
            Call::Remote(cmd) if cmd.contains("squeue") => {
                status_calls += 1;
                if status_calls == 1 { ok("RUNNING\n") } else { ok("") }
            }
            _ => ok(""),
        });

        let stream = start(
            transport.clone(),
            merged_layout(),
            options(1),
            CancellationToken::new(),
        );
        let events = collect(stream).await;

        assert!(events.iter().all(|event| event.is_ok()));
        assert_eq!(lines(&events), vec!["attempt 1", "attempt 2"]);
        assert!(matches!(events.last(), Some(Ok(LogEvent::Finished(_)))));

        let offsets: Vec<usize> = transport
            .remote_commands()
            .iter()
            .filter_map(|cmd| requested_offset(cmd))
            .collect();
        assert_eq!(offsets, vec![0, 10, 0, 10]);
    }

    #[tokio::test]
    async fn test_offsets_advance_without_duplication_or_gaps() {
        // 17 lines of 6 characters, then one character without a newline
        let content: String = (0..120u8)
            .map(|i| if i % 7 == 6 { '\n' } else { (b'a' + i % 26) as char })
            .collect();
        let visible = [50usize, 120, 120];

        let file = content.clone();
        let mut status_calls = 0usize;
        let transport = FakeTransport::new(move |call| match call {
            Call::Remote(cmd) if cmd.contains("tail") => {
                let offset = requested_offset(cmd).unwrap();
                let end = visible[status_calls.min(visible.len() - 1)];
                ok(&file[offset..end])
            }
            Call::Remote(cmd) if cmd.contains("squeue") => {
                status_calls += 1;
                if status_calls < 3 { ok("RUNNING\n") } else { ok("") }
            }
            _ => ok(""),
        });

        let stream = start(
            transport.clone(),
            merged_layout(),
            options(3),
            CancellationToken::new(),
        );
        let events = collect(stream).await;

        assert_eq!(lines(&events).join("\n"), content);
        assert!(matches!(
            events.last(),
            Some(Ok(LogEvent::Finished(JobState::Finished)))
        ));

        let offsets: Vec<usize> = transport
            .remote_commands()
            .iter()
            .filter_map(|cmd| requested_offset(cmd))
            .collect();
        assert_eq!(offsets, vec![0, 50, 120, 120]);
    }

    #[tokio::test]
    async fn test_stdout_and_stderr_are_tagged() {
        let mut served_err = false;
        let mut served_out = false;
        let transport = FakeTransport::new(move |call| match call {
            Call::Remote(cmd) if cmd.contains("slurm-12345.err") && !served_err => {
                served_err = true;
                ok("warning: low memory\n")
            }
            Call::Remote(cmd) if cmd.contains("slurm-12345.out") && !served_out => {
                served_out = true;
                ok("epoch 1 done\n")
            }
            Call::Remote(cmd) if cmd.contains("squeue") => ok("COMPLETED\n"),
            _ => ok(""),
        });

        let stream = start(
            transport,
            RemoteLayout::default(),
            options(3),
            CancellationToken::new(),
        );
        let events = collect(stream).await;

        let tagged: Vec<(LogSource, String)> = events
            .iter()
            .filter_map(|event| match event {
                Ok(LogEvent::Line(line)) => Some((line.source, line.text.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(
            tagged,
            vec![
                (LogSource::Stdout, "epoch 1 done".to_string()),
                (LogSource::Stderr, "warning: low memory".to_string()),
            ]
        );
        assert!(matches!(
            events.last(),
            Some(Ok(LogEvent::Finished(JobState::Completed)))
        ));
    }

    #[tokio::test]
    async fn test_recovers_after_fewer_than_max_failures() {
        let mut tail_calls = 0;
        let transport = FakeTransport::new(move |call| match call {
            Call::Remote(cmd) if cmd.contains("tail") => {
                tail_calls += 1;
                match tail_calls {
                    1 | 2 => fail(255, "Connection reset by peer"),
                    3 => ok("recovered\n"),
                    _ => ok(""),
                }
            }
            _ => ok(""),
        });

        let stream = start(transport, merged_layout(), options(3), CancellationToken::new());
        let events = collect(stream).await;

        assert!(events.iter().all(|event| event.is_ok()));
        assert_eq!(lines(&events), vec!["recovered".to_string()]);
        assert!(matches!(events.last(), Some(Ok(LogEvent::Finished(_)))));
    }

    #[tokio::test]
    async fn test_max_consecutive_failures_ends_stream() {
        let transport = FakeTransport::new(|_| fail(255, "Connection timed out"));

        let stream = start(
            transport.clone(),
            merged_layout(),
            options(3),
            CancellationToken::new(),
        );
        let events = collect(stream).await;

        assert_eq!(events.len(), 1);
        match &events[0] {
            Err(ClientError::Stream {
                failures,
                last_error,
            }) => {
                assert_eq!(*failures, 3);
                assert!(last_error.contains("Connection timed out"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(transport.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_cancellation_stops_polling_and_leaves_job_alone() {
        let mut first = true;
        let transport = FakeTransport::new(move |call| match call {
            Call::Remote(cmd) if cmd.contains("tail") && first => {
                first = false;
                ok("hello\n")
            }
            Call::Remote(cmd) if cmd.contains("squeue") => ok("RUNNING\n"),
            _ => ok(""),
        });
        let cancel = CancellationToken::new();

        let mut stream = start(transport.clone(), merged_layout(), options(3), cancel.clone());
        match stream.next().await {
            Some(Ok(LogEvent::Line(line))) => assert_eq!(line.text, "hello"),
            other => panic!("unexpected event: {:?}", other),
        }

        cancel.cancel();
        let rest = collect(stream).await;
        assert!(rest.iter().all(|event| !matches!(event, Ok(LogEvent::Finished(_)))));

        let issued = transport.calls().len();
        tokio::time::sleep(INTERVAL * 5).await;
        assert_eq!(transport.calls().len(), issued);
        assert!(
            transport
                .remote_commands()
                .iter()
                .all(|cmd| !cmd.contains("scancel"))
        );
    }

    #[tokio::test]
    async fn test_dropping_stream_stops_polling() {
        let transport = FakeTransport::new(|call| match call {
            Call::Remote(cmd) if cmd.contains("squeue") => ok("PENDING\n"),
            _ => ok(""),
        });

        let stream = start(
            transport.clone(),
            merged_layout(),
            options(3),
            CancellationToken::new(),
        );
        tokio::time::sleep(INTERVAL * 3).await;
        drop(stream);

        tokio::time::sleep(INTERVAL * 3).await;
        let issued = transport.calls().len();
        tokio::time::sleep(INTERVAL * 5).await;
        assert_eq!(transport.calls().len(), issued);
    }

    #[tokio::test]
    async fn test_status_queried_every_n_rounds() {
        let mut tail_calls = 0;
        let transport = FakeTransport::new(move |call| match call {
            Call::Remote(cmd) if cmd.contains("tail") => {
                tail_calls += 1;
                ok("")
            }
            Call::Remote(cmd) if cmd.contains("squeue") => {
                if tail_calls >= 4 { ok("") } else { ok("RUNNING\n") }
            }
            _ => ok(""),
        });

        let stream = start(
            transport.clone(),
            merged_layout(),
            options(3).with_status_every(3),
            CancellationToken::new(),
        );
        collect(stream).await;

        let commands = transport.remote_commands();
        let squeue_positions: Vec<usize> = commands
            .iter()
            .enumerate()
            .filter(|(_, cmd)| cmd.contains("squeue"))
            .map(|(idx, _)| idx)
            .collect();
        // Rounds 1 and 4 query the state; round 4's answer triggers the final read
        assert_eq!(squeue_positions, vec![1, 5]);
        assert_eq!(commands.len(), 7);
    }

    #[test]
    fn test_invalid_options_rejected() {
        let transport = FakeTransport::new(|_| ok(""));
        let result = LogStreamer::new(
            transport,
            merged_layout(),
            StreamOptions::default().with_max_consecutive_failures(0),
        );
        assert!(matches!(result, Err(ClientError::InvalidInput(_))));
    }
}
