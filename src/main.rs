mod jobber;

use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    process,
};

use anyhow::Result;
use clap::{Parser, Subcommand};
use fern::colors::{Color, ColoredLevelConfig};
use log::{debug, LevelFilter};

use jobber::{
    commands::Session,
    config::{Config, Overrides},
    data::JobStore,
    time::{self, TimeParser},
    Position,
};

#[derive(Parser)]
#[clap(about, version)]
/// A CLI for tracking working time on jobs
struct Cli {
    /// Job file to use instead of the configured one
    #[arg(short, long, global = true)]
    file: Option<PathBuf>,
    /// Round hours to multiples of this value
    #[arg(short = 'R', long, global = true)]
    resolution: Option<f64>,
    /// Hourly rate, shows costs next to hours
    #[arg(short = 'M', long = "money", global = true)]
    rate: Option<f64>,
    /// Print debug output
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a new job
    Start {
        /// Start time [now, 14:30, 1h-, 24.12.,9:00, ...]
        time: Option<String>,
        /// Job description
        #[arg(short, long)]
        message: Option<String>,
        /// Comma separated tags
        #[arg(short, long)]
        tags: Option<String>,
    },
    /// Start a new job with message and tags of the latest job
    Back {
        /// Start time, defaults to now
        time: Option<String>,
        /// Job description instead of the latest one
        #[arg(short, long)]
        message: Option<String>,
        /// Comma separated tags, +tag/-tag edit the latest job's tags
        #[arg(short, long, allow_hyphen_values = true)]
        tags: Option<String>,
    },
    /// End the running job
    End {
        /// End time, defaults to now
        time: Option<String>,
        /// Job description, used if the job has none yet
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Add a finished job
    ///
    /// Give two of --start, --end and --duration; a lone duration ends now
    Add {
        /// Start time
        #[arg(short, long)]
        start: Option<String>,
        /// End time
        #[arg(short, long)]
        end: Option<String>,
        /// Length of the job in hours
        #[arg(short, long)]
        duration: Option<f64>,
        /// Job description
        #[arg(short, long)]
        message: Option<String>,
        /// Comma separated tags
        #[arg(short, long)]
        tags: Option<String>,
    },
    /// Throw away the running job
    Cancel,
    /// Delete a job
    Drop {
        /// Position of the job (either an index, or [last])
        #[arg(value_parser = parse_position)]
        position: Position,
    },
    /// Merge jobs into one spanning all of them
    Join {
        /// Comma separated positions, e.g. 3,4
        #[arg(value_delimiter = ',', required = true)]
        positions: Vec<usize>,
    },
    /// Move start and/or end of a job
    Edit {
        /// Position of the job (either an index, or [last])
        #[arg(value_parser = parse_position)]
        position: Position,
        /// New start time
        #[arg(short, long)]
        start: Option<String>,
        /// New end time
        #[arg(short, long)]
        end: Option<String>,
    },
    /// Change the tags of a job
    ///
    /// Prefix tags with + or - to add or remove them, otherwise the tags are replaced
    Tag {
        /// Position of the job (either an index, or [last])
        #[arg(value_parser = parse_position)]
        position: Position,
        /// Comma separated tags
        #[arg(allow_hyphen_values = true)]
        tags: String,
    },
    /// Change the message of a job
    Message {
        /// Position of the job (either an index, or [last])
        #[arg(value_parser = parse_position)]
        position: Position,
        /// New message, \n starts a new line
        message: String,
    },
    /// Display jobs
    ///
    /// Omit <FILTER> to display all jobs
    List {
        /// Range [mon-fri, 1.12.-24.12.], start time [yesterday, 2h-] or count [3, -3]
        #[arg(allow_hyphen_values = true)]
        filter: Option<String>,
        /// Only jobs carrying all of these comma separated tags
        #[arg(short, long)]
        tags: Option<String>,
    },
    /// Display hours per day and month
    ///
    /// Omit <FILTER> to report all jobs
    Report {
        /// Range, start time or count as in list
        #[arg(allow_hyphen_values = true)]
        filter: Option<String>,
        /// Only jobs carrying all of these comma separated tags
        #[arg(short, long)]
        tags: Option<String>,
    },
    /// Display all tags in use
    Tags,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{e:#}");
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(Overrides {
        file: cli.file,
        resolution: cli.resolution,
        rate: cli.rate,
        verbose: cli.verbose,
    })?;
    init_logging(config.verbose)?;
    debug!("{config:?}");
    let mut store = JobStore::read(&config.file)?;
    let parser = TimeParser::new(time::now());

    {
        let stdin = io::stdin();
        let stdout = io::stdout();
        let mut session = Session::new(&mut store, &config, parser, stdin.lock(), stdout.lock());
        dispatch(&mut session, cli.command)?;
    }

    store.write(&config.file)?;
    Ok(())
}

fn dispatch<R: BufRead, W: Write>(session: &mut Session<'_, R, W>, command: Command) -> Result<()> {
    match command {
        Command::Start {
            time,
            message,
            tags,
        } => session.start(time, message, tags)?,
        Command::Back {
            time,
            message,
            tags,
        } => session.back(time, message, tags)?,
        Command::End { time, message } => session.end(time, message)?,
        Command::Add {
            start,
            end,
            duration,
            message,
            tags,
        } => session.add(start, end, duration, message, tags)?,
        Command::Cancel => session.cancel()?,
        Command::Drop { position } => session.drop(position)?,
        Command::Join { positions } => session.join(positions)?,
        Command::Edit {
            position,
            start,
            end,
        } => session.edit(position, start, end)?,
        Command::Tag { position, tags } => session.tag(position, tags)?,
        Command::Message { position, message } => session.message(position, message)?,
        Command::List { filter, tags } => session.list(filter, tags)?,
        Command::Report { filter, tags } => session.report(filter, tags)?,
        Command::Tags => session.tags()?,
    }
    Ok(())
}

fn init_logging(verbose: bool) -> Result<()> {
    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Blue);
    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{} {}] {}",
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .level(if verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        })
        .chain(io::stderr())
        .apply()?;
    Ok(())
}

fn parse_position(s: &str) -> Result<Position, String> {
    s.trim().parse()
}
