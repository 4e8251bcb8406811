//! Command-line interface for xml-path-stream.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use clap::{Parser, ValueEnum};
use console::style;
use serde::Serialize;

use crate::config::{ReaderOptions, DEFAULT_CHUNK_SIZE};
use crate::dispatcher::{DispatchSummary, Outcome, XmlStreamReader};
use crate::error::{ReaderError, Result};
use crate::path::XmlPath;
use crate::payload::Payload;
use crate::registry::{Callback, Control, PathHandler};
use crate::stream::{BufferedXmlStream, XmlStream};

/// xml-path-stream - Print the parts of an XML document found at the given paths.
#[derive(Parser, Debug)]
#[command(name = "xml-path-stream")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// XML file to read, or `-` for stdin
    pub input: String,

    /// Absolute path to match (e.g., /catalog/book or /catalog/book/@id)
    #[arg(short, long = "path", required = true, value_parser = parse_path)]
    pub paths: Vec<XmlPath>,

    /// Output format for matched payloads
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Xml)]
    pub format: OutputFormat,

    /// Stop after this many payloads
    #[arg(short, long)]
    pub limit: Option<u64>,

    /// Bytes read from the input per chunk
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Fail on fragments that use undeclared namespace prefixes
    #[arg(long)]
    pub strict: bool,
}

/// How matched payloads are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Fragment markup for elements, `name="value"` for attributes
    Xml,
    /// One YAML document per payload
    Yaml,
}

fn parse_path(s: &str) -> std::result::Result<XmlPath, String> {
    XmlPath::new(s).map_err(|e| e.to_string())
}

/// Run the CLI.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    stream_command(&cli)
}

/// Execute a streaming run for parsed arguments.
fn stream_command(cli: &Cli) -> Result<()> {
    let options = ReaderOptions::new()
        .with_chunk_size(cli.chunk_size)
        .with_strict_fragments(cli.strict);
    let mut reader = XmlStreamReader::with_options(options);

    let state = Arc::new(Mutex::new(PrintState::default()));
    for path in &cli.paths {
        let printer = PayloadPrinter {
            path: path.clone(),
            format: cli.format,
            limit: cli.limit,
            state: Arc::clone(&state),
        };
        reader.register_callback(path, &Callback::new(printer));
    }

    let summary = if cli.input == "-" {
        let stdin = io::stdin();
        let mut stream = BufferedXmlStream::new(stdin.lock())?;
        reader.dispatch(&mut stream)?
    } else {
        let mut stream = XmlStream::open(&cli.input)?;
        reader.dispatch(&mut stream)?
    };

    let failure = state.lock().ok().and_then(|mut state| state.failure.take());
    if let Some(err) = failure {
        return Err(err);
    }

    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &DispatchSummary) {
    let label = match summary.outcome {
        Outcome::Completed => style("Done:").green().bold(),
        Outcome::Stopped => style("Stopped:").yellow().bold(),
        Outcome::Skipped => style("Skipped:").dim(),
    };
    eprintln!(
        "{} {} payloads from {} elements ({} bytes read)",
        label,
        style(summary.payloads).cyan(),
        summary.elements,
        summary.bytes_read
    );
}

/// Progress shared by all printers of one run.
#[derive(Debug, Default)]
struct PrintState {
    printed: u64,
    failure: Option<ReaderError>,
}

/// Handler printing every payload of one path to stdout.
struct PayloadPrinter {
    path: XmlPath,
    format: OutputFormat,
    limit: Option<u64>,
    state: Arc<Mutex<PrintState>>,
}

#[derive(Serialize)]
struct YamlRecord<'a> {
    path: &'a str,
    #[serde(flatten)]
    payload: &'a Payload,
}

impl PayloadPrinter {
    fn write(&self, payload: &Payload) -> Result<()> {
        let mut out = io::stdout().lock();
        match self.format {
            OutputFormat::Xml => match payload {
                Payload::Element(fragment) => writeln!(out, "{}", fragment.xml())?,
                Payload::Attribute(attr) => writeln!(out, "{}=\"{}\"", attr.name(), attr.value())?,
            },
            OutputFormat::Yaml => {
                let record = YamlRecord {
                    path: self.path.as_str(),
                    payload,
                };
                writeln!(out, "---")?;
                write!(out, "{}", serde_yaml_ng::to_string(&record)?)?;
            }
        }
        Ok(())
    }
}

impl PathHandler for PayloadPrinter {
    fn handle(&self, payload: &Payload) -> Control {
        let Ok(mut state) = self.state.lock() else {
            return Control::StopStream;
        };
        if self.limit.is_some_and(|limit| state.printed >= limit) {
            return Control::StopStream;
        }
        if let Err(err) = self.write(payload) {
            state.failure = Some(err);
            return Control::StopStream;
        }
        state.printed += 1;
        if self.limit.is_some_and(|limit| state.printed >= limit) {
            return Control::StopStream;
        }
        Control::Continue
    }
}
