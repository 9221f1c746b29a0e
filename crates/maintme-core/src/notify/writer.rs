//! Line-oriented notifier over any writer.

use std::io::Write;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{MaintmeError, MaintmeResult};
use crate::traits::Notifier;
use crate::types::{Event, SubscriberId};

/// Writes each accepted event as one line.
///
/// ```text
/// subscriber=1 event=6374857191 2017-07-03T12:00:00Z IssuesEvent opened octo/repo#12 Crash on start
/// ```
pub struct WriterNotifier<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> WriterNotifier<W> {
    /// Wrap a writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Unwrap the writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

impl WriterNotifier<std::io::Stdout> {
    /// Notifier writing to standard output.
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

fn format_line(subscriber_id: SubscriberId, event: &Event) -> String {
    let mut line = format!(
        "subscriber={} event={} {} ",
        subscriber_id,
        event.id,
        event.created_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
    );
    push_escaped(&mut line, &event.summary());
    if let Some(url) = event.issue.as_ref().and_then(|i| i.html_url.as_deref()) {
        line.push(' ');
        push_escaped(&mut line, url);
    }
    line
}

/// Feed text may hold newlines; keep every event on one line.
fn push_escaped(line: &mut String, text: &str) {
    for c in text.chars() {
        if c.is_control() {
            line.extend(c.escape_debug());
        } else {
            line.push(c);
        }
    }
}

#[async_trait]
impl<W: Write + Send> Notifier for WriterNotifier<W> {
    async fn send(&self, subscriber_id: SubscriberId, event: &Event) -> MaintmeResult<()> {
        let line = format_line(subscriber_id, event);
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| MaintmeError::delivery("writer lock poisoned"))?;
        writeln!(writer, "{}", line)
            .and_then(|_| writer.flush())
            .map_err(|e| MaintmeError::Delivery {
                message: e.to_string(),
                code: crate::error::ErrorCode::DeliveryFailed,
                source: Some(Box::new(e)),
            })
    }
}
