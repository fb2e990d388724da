use chrono::{Datelike, Timelike};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWrite;

/// Byte-counting view of the archive output used while one entry is encoded.
///
/// Shutting it down only flushes: the end of an entry is not the end of the
/// archive, and the central directory still has to follow.
pub struct EntryWriter<'a, W: AsyncWrite + Unpin> {
    pub inner: &'a mut W,
    pub written: u64,
}

impl<'a, W: AsyncWrite + Unpin> EntryWriter<'a, W> {
    pub fn new(inner: &'a mut W) -> Self {
        Self { inner, written: 0 }
    }
}

impl<'a, W: AsyncWrite + Unpin> AsyncWrite for EntryWriter<'a, W> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let poll = Pin::new(&mut *self.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = poll {
            self.written += n as u64;
        }
        poll
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.inner).poll_flush(cx)
    }
}

/// Convert time to DOS format
pub fn dos_time(time: Option<SystemTime>) -> (u16, u16) {
    let time = time.unwrap_or_else(SystemTime::now);
    let secs_since_epoch = time
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let datetime = chrono::DateTime::<chrono::Utc>::from_timestamp(secs_since_epoch as i64, 0)
        .unwrap_or_default()
        .naive_utc();

    // DOS dates start in 1980
    let year = (datetime.year().max(1980) - 1980) as u16;
    let month = datetime.month() as u16;
    let day = datetime.day() as u16;
    let hour = datetime.hour() as u16;
    let minute = datetime.minute() as u16;
    let second = datetime.second() as u16;

    let date = (year << 9) | (month << 5) | day;
    let time = (hour << 11) | (minute << 5) | (second >> 1);

    (time, date)
}
