use anyhow::Context;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// An output file, either plain or gzip compressed.
/// Call `finish` once everything is written so the gzip trailer lands on disk.
pub enum OutputWriter {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>)
}

impl Write for OutputWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            OutputWriter::Plain(w) => w.write(buf),
            OutputWriter::Gzip(w) => w.write(buf)
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            OutputWriter::Plain(w) => w.flush(),
            OutputWriter::Gzip(w) => w.flush()
        }
    }
}

impl OutputWriter {
    /// Writes the gzip trailer if compressed and flushes everything to disk
    /// # Errors
    /// * if the final write or flush fails
    pub fn finish(self) -> anyhow::Result<()> {
        let mut inner = match self {
            OutputWriter::Plain(w) => w,
            OutputWriter::Gzip(w) => w.finish()
                .context("Error while finishing gzip stream:")?
        };
        inner.flush()
            .context("Error while flushing output:")?;
        Ok(())
    }
}

/// Creates an output file, gzip compressed if the name ends in ".gz"
/// # Arguments
/// * `filename` - the path to create
/// # Errors
/// * if the file cannot be created
pub fn create_output(filename: &Path) -> anyhow::Result<OutputWriter> {
    let file = File::create(filename)
        .with_context(|| format!("Error while creating {filename:?}:"))?;
    let writer = if filename.extension().unwrap_or_default() == "gz" {
        OutputWriter::Gzip(GzEncoder::new(BufWriter::new(file), flate2::Compression::default()))
    } else {
        OutputWriter::Plain(BufWriter::new(file))
    };
    Ok(writer)
}

/// Saves any serializable struct as pretty JSON, used for the debug copy of the CLI settings
/// # Arguments
/// * `data` - the data in memory
/// * `out_filename` - user provided path to write to
/// # Errors
/// * if opening or writing to the file throw errors
/// * if JSON serialization throws errors
pub fn save_json<T: serde::Serialize>(data: &T, out_filename: &Path) -> anyhow::Result<()> {
    let mut writer = create_output(out_filename)?;
    serde_json::to_writer_pretty(&mut writer, data)
        .with_context(|| format!("Error while serializing {out_filename:?}:"))?;
    writer.finish()
        .with_context(|| format!("Error while closing {out_filename:?}:"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[derive(serde::Serialize)]
    struct Example {
        label: String,
        threads: usize
    }

    #[test]
    fn test_save_json_gz() {
        let temp_dir = tempfile::tempdir().unwrap();
        let out_filename = temp_dir.path().join("settings.json.gz");
        let data = Example { label: "test".to_string(), threads: 4 };
        save_json(&data, &out_filename).unwrap();

        // a plain GzDecoder fails on a stream without its trailer
        let mut text = String::new();
        flate2::read::GzDecoder::new(File::open(&out_filename).unwrap())
            .read_to_string(&mut text).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["label"], "test");
        assert_eq!(parsed["threads"], 4);
    }

    #[test]
    fn test_plain_output() {
        let temp_dir = tempfile::tempdir().unwrap();
        let out_filename = temp_dir.path().join("rows.tsv");
        let mut writer = create_output(&out_filename).unwrap();
        assert!(matches!(writer, OutputWriter::Plain(_)));
        writer.write_all(b"a\tb\n").unwrap();
        writer.finish().unwrap();
        assert_eq!(std::fs::read_to_string(&out_filename).unwrap(), "a\tb\n");
    }

    #[test]
    fn test_gzip_finish() {
        let temp_dir = tempfile::tempdir().unwrap();
        let out_filename = temp_dir.path().join("rows.tsv.gz");
        let mut writer = create_output(&out_filename).unwrap();
        assert!(matches!(writer, OutputWriter::Gzip(_)));
        writer.write_all(b"a\tb\n").unwrap();
        writer.finish().unwrap();

        let bytes = std::fs::read(&out_filename).unwrap();
        // gzip trailer: CRC32 then the uncompressed length, little endian
        assert_eq!(bytes[bytes.len() - 4..], 4_u32.to_le_bytes());
        let mut text = String::new();
        flate2::read::GzDecoder::new(bytes.as_slice()).read_to_string(&mut text).unwrap();
        assert_eq!(text, "a\tb\n");
    }

    #[test]
    fn test_create_output_missing_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(create_output(&temp_dir.path().join("missing").join("out.tsv")).is_err());
    }
}
