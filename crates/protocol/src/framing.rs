//! Blocking read helpers used by the receive loop.
//!
//! Both helpers retry on [`io::ErrorKind::Interrupted`] so callers only
//! ever see real stream conditions.

use std::io::{self, Read};

/// Reads until at least `at_least` bytes sit in `region`, given that
/// `have` bytes are already there, and returns the new total.
///
/// The total is capped by `region.len()`: once the region is full the
/// accumulated count is returned even if it is short of `at_least`. EOF
/// also returns the accumulated count, which may be zero.
///
/// # Errors
///
/// A read error is returned only when nothing had been accumulated;
/// after the first byte the error is swallowed and the bytes are
/// returned, leaving the failure to surface on the next call.
pub fn read_at_least<R: Read>(
    reader: &mut R,
    region: &mut [u8],
    at_least: usize,
    have: usize,
) -> io::Result<usize> {
    debug_assert!(have <= region.len(), "have {have} overruns region");
    let mut len = have;
    while len < at_least {
        if len == region.len() {
            break;
        }
        match reader.read(&mut region[len..]) {
            Ok(0) => break,
            Ok(n) => len += n,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => {
                if len > 0 {
                    return Ok(len);
                }
                return Err(error);
            }
        }
    }
    Ok(len)
}

/// Performs a single read of up to `min(buf.len(), at_most)` bytes.
///
/// Returns `Ok(0)` on EOF.
///
/// # Errors
///
/// Propagates the underlying read error.
pub fn read_at_most<R: Read>(reader: &mut R, buf: &mut [u8], at_most: usize) -> io::Result<usize> {
    let target = at_most.min(buf.len());
    loop {
        match reader.read(&mut buf[..target]) {
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::Cursor;

    /// Reader that replays a script of results, a few bytes at a time.
    struct ScriptedReader {
        script: VecDeque<io::Result<Vec<u8>>>,
    }

    impl ScriptedReader {
        fn new(script: Vec<io::Result<Vec<u8>>>) -> Self {
            Self {
                script: script.into(),
            }
        }
    }

    impl Read for ScriptedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.script.pop_front() {
                Some(Ok(bytes)) => {
                    assert!(bytes.len() <= buf.len(), "script chunk larger than buffer");
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                Some(Err(error)) => Err(error),
                None => Ok(0),
            }
        }
    }

    #[test]
    fn accumulates_across_short_reads() {
        let mut reader = ScriptedReader::new(vec![
            Ok(vec![1, 2]),
            Ok(vec![3]),
            Ok(vec![4, 5, 6]),
        ]);
        let mut region = [0u8; 16];
        let len = read_at_least(&mut reader, &mut region, 6, 0).unwrap();
        assert_eq!(len, 6);
        assert_eq!(&region[..6], &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn counts_preexisting_bytes() {
        let mut reader = ScriptedReader::new(vec![Ok(vec![9, 9])]);
        let mut region = [0u8; 8];
        region[0] = 7;
        let len = read_at_least(&mut reader, &mut region, 3, 1).unwrap();
        assert_eq!(len, 3);
        assert_eq!(&region[..3], &[7, 9, 9]);
    }

    #[test]
    fn eof_returns_short_count() {
        let mut reader = Cursor::new(vec![1u8, 2]);
        let mut region = [0u8; 8];
        let len = read_at_least(&mut reader, &mut region, 6, 0).unwrap();
        assert_eq!(len, 2);
    }

    #[test]
    fn eof_with_nothing_buffered_returns_zero() {
        let mut reader = Cursor::new(Vec::<u8>::new());
        let mut region = [0u8; 8];
        assert_eq!(read_at_least(&mut reader, &mut region, 4, 0).unwrap(), 0);
    }

    #[test]
    fn full_region_stops_the_loop() {
        let mut reader = ScriptedReader::new(vec![Ok(vec![1, 2, 3, 4])]);
        let mut region = [0u8; 4];
        let len = read_at_least(&mut reader, &mut region, 10, 0).unwrap();
        assert_eq!(len, 4);
    }

    #[test]
    fn error_after_bytes_returns_the_bytes() {
        let mut reader = ScriptedReader::new(vec![
            Ok(vec![1, 2]),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ]);
        let mut region = [0u8; 8];
        assert_eq!(read_at_least(&mut reader, &mut region, 6, 0).unwrap(), 2);
    }

    #[test]
    fn error_with_no_bytes_propagates() {
        let mut reader = ScriptedReader::new(vec![Err(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "reset",
        ))]);
        let mut region = [0u8; 8];
        let error = read_at_least(&mut reader, &mut region, 6, 0).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::ConnectionReset);
    }

    #[test]
    fn interrupted_reads_are_retried() {
        let mut reader = ScriptedReader::new(vec![
            Err(io::Error::new(io::ErrorKind::Interrupted, "eintr")),
            Ok(vec![5, 6, 7]),
        ]);
        let mut region = [0u8; 8];
        assert_eq!(read_at_least(&mut reader, &mut region, 3, 0).unwrap(), 3);

        let mut reader = ScriptedReader::new(vec![
            Err(io::Error::new(io::ErrorKind::Interrupted, "eintr")),
            Ok(vec![1]),
        ]);
        let mut buf = [0u8; 8];
        assert_eq!(read_at_most(&mut reader, &mut buf, 4).unwrap(), 1);
    }

    #[test]
    fn read_at_most_caps_at_requested_count() {
        let mut reader = Cursor::new(vec![1u8, 2, 3, 4, 5]);
        let mut buf = [0u8; 8];
        assert_eq!(read_at_most(&mut reader, &mut buf, 3).unwrap(), 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);
    }

    #[test]
    fn read_at_most_caps_at_buffer_len() {
        let mut reader = Cursor::new(vec![1u8, 2, 3, 4, 5]);
        let mut buf = [0u8; 2];
        assert_eq!(read_at_most(&mut reader, &mut buf, 100).unwrap(), 2);
    }

    #[test]
    fn read_at_most_reports_eof() {
        let mut reader = Cursor::new(Vec::<u8>::new());
        let mut buf = [0u8; 4];
        assert_eq!(read_at_most(&mut reader, &mut buf, 4).unwrap(), 0);
    }
}
