// Copyright 2022 Mathew Odden <mathewrodden@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::path::Path;

use tracing::trace;

pub const CHUNK_SIZE: usize = 1024;

/// Copies `src` into a newly created (or truncated) file at `dest`, one
/// chunk at a time, flushing after every chunk.
///
/// Returns the number of bytes written. On error the partially written
/// file is left in place.
pub fn stream_to_file<R: Read + ?Sized>(src: &mut R, dest: &Path) -> std::io::Result<u64> {
    let mut file = File::create(dest)?;
    let mut buf = [0u8; CHUNK_SIZE];
    let mut written = 0u64;

    loop {
        let n = match src.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };

        file.write_all(&buf[..n])?;
        file.flush()?;
        written += n as u64;
    }

    trace!("wrote {} bytes to {}", written, dest.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_copy_around_chunk_boundaries() {
        let dir = tempfile::tempdir().unwrap();

        for len in [0, 1, 1023, 1024, 1025, 2048, 1024 * 1024 + 17] {
            let data = pattern(len);
            let dest = dir.path().join(format!("out-{}", len));

            let n = stream_to_file(&mut Cursor::new(data.clone()), &dest).unwrap();

            assert_eq!(n, len as u64);
            assert_eq!(std::fs::read(&dest).unwrap(), data, "length {}", len);
        }
    }

    #[test]
    fn test_overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("obj");
        std::fs::write(&dest, vec![7u8; 5000]).unwrap();

        stream_to_file(&mut Cursor::new(b"short".to_vec()), &dest).unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"short");
    }

    /// Hands out a few bytes per read and fails after `fail_after` bytes.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        step: usize,
        fail_after: Option<usize>,
        interrupted: bool,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::new(ErrorKind::Interrupted, "signal"));
            }
            if let Some(limit) = self.fail_after {
                if self.pos >= limit {
                    return Err(std::io::Error::new(ErrorKind::ConnectionReset, "reset"));
                }
            }
            let end = (self.pos + self.step).min(self.data.len());
            let n = (end - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn test_short_reads_and_interrupts() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("obj");
        let data = pattern(3000);

        let mut src = Trickle {
            data: data.clone(),
            pos: 0,
            step: 333,
            fail_after: None,
            interrupted: false,
        };

        assert_eq!(stream_to_file(&mut src, &dest).unwrap(), 3000);
        assert_eq!(std::fs::read(&dest).unwrap(), data);
    }

    #[test]
    fn test_failure_leaves_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("obj");
        let data = pattern(4096);

        let mut src = Trickle {
            data: data.clone(),
            pos: 0,
            step: 1024,
            fail_after: Some(2048),
            interrupted: false,
        };

        let err = stream_to_file(&mut src, &dest).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionReset);
        assert_eq!(std::fs::read(&dest).unwrap(), &data[..2048]);
    }
}
