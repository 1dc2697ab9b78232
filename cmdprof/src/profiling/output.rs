//! Output files shared by the file-backed channels

use crate::domain::{Channel, ProfilingError};
use flate2::write::GzEncoder;
use flate2::Compression;
use pprof::protos::Message;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Create (or truncate) the destination file of a channel
pub(crate) fn create_output(channel: Channel, path: &Path) -> Result<File, ProfilingError> {
    File::create(path).map_err(|source| ProfilingError::CreateOutput {
        channel,
        path: path.to_path_buf(),
        source,
    })
}

/// Write a pprof profile as gzip-compressed `profile.proto`, then flush and close the file
pub(crate) fn write_pprof(
    channel: Channel,
    path: &Path,
    file: File,
    profile: &pprof::protos::Profile,
) -> Result<(), ProfilingError> {
    let encoded = profile.encode_to_vec();
    write_gzipped(file, &encoded).map_err(|source| ProfilingError::WriteOutput {
        channel,
        path: path.to_path_buf(),
        source,
    })
}

/// Gzip `bytes` into any writer
pub(crate) fn gzip_into<W: Write>(writer: W, bytes: &[u8]) -> std::io::Result<W> {
    let mut encoder = GzEncoder::new(writer, Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}

fn write_gzipped(file: File, bytes: &[u8]) -> std::io::Result<()> {
    let writer = gzip_into(BufWriter::new(file), bytes)?;
    let file = writer.into_inner().map_err(std::io::IntoInnerError::into_error)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn test_gzip_into_buffer() {
        let buffer = gzip_into(Vec::new(), b"profile bytes").unwrap();
        let mut decoded = Vec::new();
        GzDecoder::new(&buffer[..]).read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, b"profile bytes");
    }

    #[test]
    fn test_create_output_in_missing_directory() {
        let err = create_output(Channel::Heap, Path::new("/nonexistent/dir/mem.out")).unwrap_err();
        assert!(matches!(err, ProfilingError::CreateOutput { channel: Channel::Heap, .. }));
    }
}
