use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

///
/// Read every line of the input_file into memory
///
/// * `input_file` - file name--either gzipped or not
///
pub fn read_lines(input_file_path: &str) -> anyhow::Result<Vec<Box<str>>> {
    let buf: Box<dyn BufRead> = open_buf_reader(input_file_path)?;
    let mut lines = vec![];
    for x in buf.lines() {
        lines.push(x?.into_boxed_str());
    }
    Ok(lines)
}

///
/// Write every line into the output_file
///
/// * `lines` - vector of lines
/// * `output_file` - file name--either gzipped or not
///
pub fn write_lines<T>(lines: &[T], output_file_path: &str) -> anyhow::Result<()>
where
    T: std::fmt::Display,
{
    let mut buf = open_buf_writer(output_file_path)?;
    for line in lines {
        if let Err(e) = writeln!(buf, "{}", line) {
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                return Ok(());
            } else {
                return Err(anyhow::anyhow!("unexpected error: {}", e));
            }
        }
    }
    buf.flush()?;
    Ok(())
}

pub struct ReadLinesOut {
    pub lines: Vec<Vec<Box<str>>>,
    pub header: Vec<Box<str>>,
}

///
/// Read lines and split them into words. Empty lines and lines
/// starting with `#` or `%` are skipped.
///
/// * `input_file` - file name--either gzipped or not
/// * `delim` - delimiter; `None` splits on any whitespace
/// * `has_header` - take the first remaining line as a header
///
pub fn read_lines_of_words(
    input_file: &str,
    delim: Option<char>,
    has_header: bool,
) -> anyhow::Result<ReadLinesOut> {
    fn is_data_line(line: &str) -> bool {
        !(line.trim().is_empty() || line.starts_with('#') || line.starts_with('%'))
    }

    let split = |line: &str| -> Vec<Box<str>> {
        match delim {
            Some(d) => line.split(d).map(|x| Box::from(x.trim())).collect(),
            None => line.split_whitespace().map(Box::from).collect(),
        }
    };

    let mut lines: Vec<Vec<Box<str>>> = read_lines(input_file)?
        .iter()
        .filter(|x| is_data_line(x))
        .map(|x| split(x))
        .collect();

    let header = if has_header {
        if lines.is_empty() {
            anyhow::bail!("no header line in {}", input_file);
        }
        lines.remove(0)
    } else {
        vec![]
    };

    Ok(ReadLinesOut { lines, header })
}

///
/// Open a file for reading, and return a buffered reader
/// * `input_file` - file name--either gzipped or not
pub fn open_buf_reader(input_file: &str) -> anyhow::Result<Box<dyn BufRead>> {
    let ext = Path::new(input_file).extension().and_then(|x| x.to_str());
    let file = File::open(input_file)
        .map_err(|e| anyhow::anyhow!("failed to open {}: {}", input_file, e))?;
    match ext {
        Some("gz") => Ok(Box::new(BufReader::new(GzDecoder::new(file)))),
        _ => Ok(Box::new(BufReader::new(file))),
    }
}

///
/// Open a file for writing, and return a buffered writer
/// * `output_file` - file name--either gzipped or not
pub fn open_buf_writer(output_file: &str) -> anyhow::Result<Box<dyn Write>> {
    // we can simply override with stdout
    if output_file.eq_ignore_ascii_case("stdout") {
        return Ok(Box::new(BufWriter::new(std::io::stdout())));
    }

    let ext = Path::new(output_file).extension().and_then(|x| x.to_str());
    let file = File::create(output_file)
        .map_err(|e| anyhow::anyhow!("failed to create {}: {}", output_file, e))?;
    match ext {
        Some("gz") => {
            let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            Ok(Box::new(BufWriter::new(encoder)))
        }
        _ => Ok(Box::new(BufWriter::new(file))),
    }
}

///
/// Create the parent directory of a file if needed
/// * `file` - file name
///
pub fn mkdir(file: &str) -> anyhow::Result<()> {
    if let Some(dir) = Path::new(file).parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    Ok(())
}

///
/// Take the basename of a file, dropping `.gz` and one more extension
/// * `file` - file name
///
pub fn basename(file: &str) -> anyhow::Result<Box<str>> {
    let path = Path::new(file.strip_suffix(".gz").unwrap_or(file));
    if let Some(base) = path.file_stem().and_then(|x| x.to_str()) {
        Ok(Box::from(base))
    } else {
        Err(anyhow::anyhow!("no file stem: {}", file))
    }
}

///
/// Return the first existing `dir/name` among `candidates`
///
pub fn find_file_in_dir(dir: &str, candidates: &[&str]) -> anyhow::Result<Box<str>> {
    for name in candidates {
        let path = Path::new(dir).join(name);
        if path.exists() {
            if let Some(x) = path.to_str() {
                return Ok(Box::from(x));
            }
        }
    }
    Err(anyhow::anyhow!(
        "none of {:?} found in {}",
        candidates,
        dir
    ))
}
