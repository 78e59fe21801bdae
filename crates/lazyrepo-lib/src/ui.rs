use std::{
    hash::{Hash, Hasher},
    io::Write,
};

use console::Style;

/// The styled `key> ` prefix put in front of a task's output lines.
///
/// Each key hashes to a fixed slot in a small palette, so a task keeps its
/// color across runs and the assignment never depends on scheduling order.
/// Red is deliberately not in the palette; it stays reserved for failures.
pub fn task_prefix(key: &str) -> String {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    key.hash(&mut hasher);
    let style = match hasher.finish() % 5 {
        0 => Style::new().blue(),
        1 => Style::new().green(),
        2 => Style::new().magenta(),
        3 => Style::new().yellow(),
        _ => Style::new().cyan(),
    };
    style.apply_to(format!("{key}> ")).to_string()
}

/// Prefixes every complete line written through it. Partial lines are
/// buffered until their newline arrives so interleaved writers cannot split
/// a prefix from its line.
pub struct PrefixedWriter<W> {
    prefix: String,
    writer: W,
    buffer: Vec<u8>,
}

impl<W: Write> PrefixedWriter<W> {
    pub fn new(prefix: String, writer: W) -> Self {
        Self {
            prefix,
            writer,
            buffer: Vec::new(),
        }
    }
}

impl<W: Write> Write for PrefixedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            self.writer.write_all(self.prefix.as_bytes())?;
            self.writer.write_all(&line)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_task_prefix_is_stable_and_names_the_key() {
        let first = task_prefix("build::packages/utils");
        assert_eq!(first, task_prefix("build::packages/utils"));
        assert!(console::strip_ansi_codes(&first).starts_with("build::packages/utils> "));
    }

    #[test]
    fn test_prefixed_writer_prefixes_each_line() {
        let mut out = Vec::new();
        {
            let mut writer = PrefixedWriter::new("pre> ".to_string(), &mut out);
            writer.write_all(b"one\ntw").unwrap();
            writer.write_all(b"o\n").unwrap();
        }
        assert_eq!(String::from_utf8(out).unwrap(), "pre> one\npre> two\n");
    }
}
