//! Drain a reader of unknown length into an exactly sized buffer.

use std::io::{self, ErrorKind, Read};
use tracing::trace;

/// Starting capacity when the caller gives none.
pub const DEFAULT_INITIAL_CAPACITY: usize = 32 * 1024;

/// Read `reader` to exhaustion.
///
/// The buffer starts at `initial_capacity` (or [`DEFAULT_INITIAL_CAPACITY`]
/// for `None` or zero) and doubles whenever it fills and a one-byte probe
/// shows more data. The result is trimmed to the bytes actually read.
/// Interrupted reads are retried; any other error is returned.
pub fn read_stream_fully<R: Read>(
    mut reader: R,
    initial_capacity: Option<usize>,
) -> io::Result<Vec<u8>> {
    let capacity = match initial_capacity {
        Some(capacity) if capacity > 0 => capacity,
        _ => DEFAULT_INITIAL_CAPACITY,
    };

    let mut buffer = vec![0u8; capacity];
    let mut read = 0;

    loop {
        let chunk = match reader.read(&mut buffer[read..]) {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if chunk == 0 {
            break;
        }
        read += chunk;

        if read == buffer.len() {
            let mut probe = [0u8; 1];
            let extra = loop {
                match reader.read(&mut probe) {
                    Ok(n) => break n,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                }
            };
            if extra == 0 {
                break;
            }

            let grown = buffer.len() * 2;
            buffer.resize(grown, 0);
            buffer[read] = probe[0];
            read += 1;
            trace!(capacity = grown, "grew stream buffer");
        }
    }

    buffer.truncate(read);
    buffer.shrink_to_fit();
    Ok(buffer)
}
