use std::{env, path::PathBuf};

use anyhow::{anyhow, Context, Result};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExperimentMode {
    Full,
    Test,
}

impl ExperimentMode {
    pub fn from_str(value: &str) -> Result<Self> {
        match value {
            "full" => Ok(Self::Full),
            "test" => Ok(Self::Test),
            other => Err(anyhow!("invalid mode: {}", other)),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Test => "test",
        }
    }

    pub fn select<T>(&self, full: T, test: T) -> T {
        match self {
            Self::Full => full,
            Self::Test => test,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Command {
    /// Train and evaluate one model on one image.
    Train,
    /// Search the gaussian standard deviation over an integer range.
    Sweep,
}

impl Command {
    pub fn from_str(value: &str) -> Result<Self> {
        match value {
            "train" => Ok(Self::Train),
            "sweep" => Ok(Self::Sweep),
            other => Err(anyhow!("invalid command: {}", other)),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Sweep => "sweep",
        }
    }
}

/// Parsed command line. Options left unset fall back to the run configuration.
#[derive(Clone, Debug)]
pub struct RunArgs {
    pub command: Command,
    pub mode: ExperimentMode,
    pub image: Option<usize>,
    pub epochs: Option<usize>,
    pub start: Option<u32>,
    pub end: Option<u32>,
    pub images: Option<usize>,
    pub data_dir: Option<PathBuf>,
    pub save_output: bool,
    pub help_requested: bool,
}

impl RunArgs {
    pub fn parse_from_env() -> Result<Self> {
        Self::parse(env::args().skip(1))
    }

    pub fn parse<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut parsed = Self {
            command: Command::Train,
            mode: ExperimentMode::Full,
            image: None,
            epochs: None,
            start: None,
            end: None,
            images: None,
            data_dir: None,
            save_output: false,
            help_requested: false,
        };
        let mut command: Option<Command> = None;
        let mut iter = args.into_iter();

        while let Some(arg) = iter.next() {
            let (flag, inline) = match arg.split_once('=') {
                Some((flag, value)) if flag.starts_with("--") => (flag.to_owned(), Some(value.to_owned())),
                _ => (arg.clone(), None),
            };
            let mut value = || -> Result<String> {
                match &inline {
                    Some(value) => Ok(value.clone()),
                    None => iter
                        .next()
                        .ok_or_else(|| anyhow!("expected value after {}", flag)),
                }
            };

            match flag.as_str() {
                "--mode" | "-m" => parsed.mode = ExperimentMode::from_str(&value()?)?,
                "--image" => parsed.image = Some(parse_number(&flag, &value()?)?),
                "--epochs" => parsed.epochs = Some(parse_number(&flag, &value()?)?),
                "--start" => parsed.start = Some(parse_number(&flag, &value()?)?),
                "--end" => parsed.end = Some(parse_number(&flag, &value()?)?),
                "--images" => parsed.images = Some(parse_number(&flag, &value()?)?),
                "--data" => parsed.data_dir = Some(PathBuf::from(value()?)),
                "--save-output" => parsed.save_output = true,
                "--help" | "-h" => parsed.help_requested = true,
                other if !other.starts_with('-') && command.is_none() => {
                    command = Some(Command::from_str(other)?);
                }
                other => return Err(anyhow!("unexpected argument: {}", other)),
            }
        }

        parsed.command = command.unwrap_or(Command::Train);
        Ok(parsed)
    }
}

fn parse_number<T>(flag: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .with_context(|| format!("invalid value for {}: {}", flag, value))
}

pub const USAGE: &str = "Usage: cargo run -p fourier-dnn-image-regression -- [train|sweep] [--mode full|test]
    [--image N] [--epochs N] [--save-output]       train one model on image N
    [--start N] [--end N] [--images N]             sweep std_dev over [start, end]
    [--data DIR]                                   directory of training images";
