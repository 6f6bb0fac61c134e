//! exigram CLI — XML <-> EXI conversion with built-in grammars.

use std::io::{IsTerminal, Read, Write};
use std::process;

use clap::{Args, Parser, Subcommand};
use exigram::{
    events_to_xml, parse_events, Alignment, CodecConfig, Decoder, Encoder, GrammarCache, GrammarOptions,
    Preserve, ProfileLimits,
};

#[derive(Parser)]
#[command(name = "exigram", about = "XML <-> EXI conversion (schema-less)")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Encode XML to EXI
    Encode(EncodeArgs),
    /// Decode EXI to XML
    Decode(CommonArgs),
}

#[derive(Args)]
struct EncodeArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Write "$EXI" cookie
    #[arg(long)]
    cookie: bool,
}

#[derive(Args)]
struct CommonArgs {
    /// Input file (- for stdin)
    #[arg(short, long)]
    input: String,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<String>,

    /// Byte alignment
    #[arg(long)]
    byte_aligned: bool,

    // -- Fidelity (preserve) --
    /// Preserve comments (CM)
    #[arg(long)]
    preserve_comments: bool,

    /// Preserve processing instructions (PI)
    #[arg(long)]
    preserve_pis: bool,

    /// Preserve DTDs and entity references (DT/ER)
    #[arg(long)]
    preserve_dtd: bool,

    /// Preserve namespace prefixes
    #[arg(long)]
    preserve_prefixes: bool,

    /// Preserve lexical values
    #[arg(long)]
    preserve_lexical: bool,

    // -- Lern-Grenzen --
    /// Learned productions per built-in grammar
    #[arg(long)]
    max_learned: Option<usize>,

    /// Learned productions across all built-in grammars
    #[arg(long)]
    max_productions: Option<usize>,

    /// Built-in element grammars before names share the any-type grammar
    #[arg(long)]
    max_element_grammars: Option<usize>,
}

impl CommonArgs {
    fn to_options(&self) -> GrammarOptions {
        GrammarOptions::default()
            .with_preserve(Preserve {
                comments: self.preserve_comments,
                pis: self.preserve_pis,
                dtd: self.preserve_dtd,
                prefixes: self.preserve_prefixes,
                lexical_values: self.preserve_lexical,
            })
            .with_profile(ProfileLimits {
                max_learned_per_grammar: self.max_learned,
                max_built_in_productions: self.max_productions,
                max_built_in_element_grammars: self.max_element_grammars,
            })
    }

    fn alignment(&self) -> Alignment {
        if self.byte_aligned { Alignment::ByteAligned } else { Alignment::BitPacked }
    }
}

fn read_input(path: &str) -> Result<Vec<u8>, String> {
    if path == "-" {
        if std::io::stdin().is_terminal() {
            eprintln!("Lese von stdin (Ctrl+D zum Beenden)...");
        }
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .map_err(|e| format!("Lesefehler (stdin): {e}"))?;
        Ok(buf)
    } else {
        std::fs::read(path).map_err(|e| format!("Lesefehler '{path}': {e}"))
    }
}

fn write_output(path: Option<&str>, data: &[u8]) -> Result<(), String> {
    match path {
        None | Some("-") => std::io::stdout()
            .lock()
            .write_all(data)
            .map_err(|e| format!("Schreibfehler (stdout): {e}")),
        Some(path) => std::fs::write(path, data).map_err(|e| format!("Schreibfehler '{path}': {e}")),
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Fehler: {e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Command::Encode(args) => encode(&args),
        Command::Decode(args) => decode(&args),
    }
}

fn encode(args: &EncodeArgs) -> Result<(), String> {
    let common = &args.common;
    let cache = GrammarCache::compile(None, common.to_options()).map_err(|e| e.to_string())?;
    let input = read_input(&common.input)?;
    let xml = String::from_utf8(input).map_err(|e| format!("Eingabe ist kein UTF-8: {e}"))?;
    let events = parse_events(&xml, cache.options()).map_err(|e| e.to_string())?;

    let config = CodecConfig { alignment: common.alignment(), include_cookie: args.cookie };
    let mut encoder = Encoder::new(&cache, config);
    for (index, event) in events.iter().enumerate() {
        encoder.feed(event).map_err(|e| format!("Event {index} ({event}): {e}"))?;
    }
    let bytes = encoder.finish().map_err(|e| e.to_string())?;
    write_output(common.output.as_deref(), &bytes)
}

fn decode(args: &CommonArgs) -> Result<(), String> {
    let cache = GrammarCache::compile(None, args.to_options()).map_err(|e| e.to_string())?;
    let input = read_input(&args.input)?;
    let config = CodecConfig { alignment: args.alignment(), include_cookie: false };
    let events = Decoder::new(&cache, &input, config)
        .and_then(|decoder| decoder.collect::<exigram::Result<Vec<_>>>())
        .map_err(|e| e.to_string())?;
    let xml = events_to_xml(&events).map_err(|e| e.to_string())?;
    write_output(args.output.as_deref(), xml.as_bytes())
}
