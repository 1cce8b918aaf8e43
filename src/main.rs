use clap::{Parser, Subcommand, ValueEnum};
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use unframe::{FileSource, ReadStatus, Rp66, Stream, TapeImage};

#[derive(Parser)]
#[command(name = "unframe")]
#[command(about = "Read the logical payload out of framed well-log files", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Strip framing layers and write the payload to stdout
    Cat {
        input: PathBuf,
        /// Framing layers to strip, outermost first; may be repeated
        #[arg(short, long = "layer", value_enum)]
        layers: Vec<Layer>,
        /// Absolute file offset to treat as the start of the stream
        #[arg(short, long)]
        zero: Option<i64>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Layer {
    /// Tape image record framing
    Tif,
    /// Rp66 visible envelopes
    Rp66,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    match &cli.command {
        Commands::Cat { input, layers, zero } => {
            let file = File::open(input)?;
            let mut stream: Box<dyn Stream> = match zero {
                Some(z) => Box::new(FileSource::open_at(file, *z)?),
                None => Box::new(FileSource::open(file)),
            };
            for layer in layers {
                stream = match layer {
                    Layer::Tif => Box::new(TapeImage::open(stream)),
                    Layer::Rp66 => Box::new(Rp66::open(stream)),
                };
            }

            let stdout = io::stdout();
            let mut out = stdout.lock();
            let mut buf = [0u8; 1024];
            loop {
                let r = match stream.read(&mut buf) {
                    Ok(r) => r,
                    Err(e) => {
                        out.write_all(&buf[..e.nread])?;
                        return Err(Box::new(e));
                    }
                };
                out.write_all(&buf[..r.nread])?;
                if r.status == ReadStatus::Eof {
                    break;
                }
            }
            stream.close()?;
        }
    }
    Ok(())
}
