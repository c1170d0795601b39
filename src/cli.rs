//! Command-line flags and the interactive prompts that fill in whatever the
//! flags leave out.

use anyhow::{bail, Context, Result};
use bridge_traits::catalog::{CollectionKind, QualityTier};
use clap::{Parser, ValueEnum};
use core_download::{DownloadRequest, LyricMode, DEFAULT_CONCURRENCY};
use core_runtime::config::{ConfigFile, DEFAULT_CONFIG_PATH, MAX_CONCURRENCY};
use core_runtime::logging::LogFormat;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

/// Batch downloader for the NetEase Cloud Music catalog.
#[derive(Parser, Debug)]
#[command(name = "ncm-downloader")]
#[command(version, about)]
pub struct Args {
    /// What the id refers to
    #[arg(short, long, value_enum)]
    pub kind: Option<RequestKind>,

    /// Song, playlist, album or artist id
    #[arg(short, long)]
    pub id: Option<String>,

    /// Quality tier, 1-8 or its name (e.g. `lossless`)
    #[arg(short, long)]
    pub quality: Option<QualityTier>,

    /// `embed` keeps lyrics in the tag only, `file` also writes a `.lrc`
    #[arg(short, long)]
    pub lyrics: Option<LyricMode>,

    /// Parallel downloads (1-50)
    #[arg(short, long, value_parser = parse_concurrency)]
    pub concurrency: Option<usize>,

    /// Config document with the API URL and cookie
    #[arg(long, default_value = DEFAULT_CONFIG_PATH, env = "NCM_CONFIG")]
    pub config: PathBuf,

    /// Root directory for downloaded files
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// pretty, json or compact
    #[arg(long, env = "NCM_LOG_FORMAT")]
    pub log_format: Option<LogFormat>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RequestKind {
    Song,
    Playlist,
    Album,
    Artist,
}

impl RequestKind {
    const MENU: [(RequestKind, &'static str); 4] = [
        (RequestKind::Song, "Song"),
        (RequestKind::Playlist, "Playlist"),
        (RequestKind::Album, "Album"),
        (RequestKind::Artist, "Artist catalog"),
    ];

    pub fn into_request(self, id: String) -> DownloadRequest {
        match self {
            RequestKind::Song => DownloadRequest::Song(id),
            RequestKind::Playlist => DownloadRequest::Collection {
                kind: CollectionKind::Playlist,
                id,
            },
            RequestKind::Album => DownloadRequest::Collection {
                kind: CollectionKind::Album,
                id,
            },
            RequestKind::Artist => DownloadRequest::Collection {
                kind: CollectionKind::ArtistCatalog,
                id,
            },
        }
    }
}

/// Parse a worker count, accepting only `1..=MAX_CONCURRENCY`.
pub fn parse_concurrency(raw: &str) -> std::result::Result<usize, String> {
    let n: usize = raw
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number", raw.trim()))?;
    if (1..=MAX_CONCURRENCY).contains(&n) {
        Ok(n)
    } else {
        Err(format!("concurrency must be between 1 and {}", MAX_CONCURRENCY))
    }
}

/// Everything one run needs besides the config document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunChoices {
    pub request: DownloadRequest,
    pub quality: QualityTier,
    pub lyric_mode: LyricMode,
    pub concurrency: usize,
}

/// Line-oriented questions over any reader/writer pair.
pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Ask once and return the trimmed answer.
    fn ask(&mut self, question: &str) -> Result<String> {
        write!(self.output, "{}", question)?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "input closed"))
                .context("No answer to prompt");
        }
        Ok(line.trim().to_string())
    }

    /// Ask until `parse` accepts the answer.
    fn ask_until<T, F>(&mut self, question: &str, mut parse: F) -> Result<T>
    where
        F: FnMut(&str) -> std::result::Result<T, String>,
    {
        loop {
            let answer = self.ask(question)?;
            match parse(&answer) {
                Ok(value) => return Ok(value),
                Err(reason) => writeln!(self.output, "{}", reason)?,
            }
        }
    }

    fn say(&mut self, line: &str) -> Result<()> {
        writeln!(self.output, "{}", line)?;
        Ok(())
    }

    pub fn kind(&mut self) -> Result<RequestKind> {
        let menu = RequestKind::MENU
            .iter()
            .enumerate()
            .map(|(i, (_, label))| format!("[{}] {}", i + 1, label))
            .collect::<Vec<_>>()
            .join(" ");
        self.ask_until(&format!("Download type: {}: ", menu), |answer| {
            answer
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| RequestKind::MENU.get(i))
                .map(|(kind, _)| *kind)
                .ok_or_else(|| format!("Choose 1-{}", RequestKind::MENU.len()))
        })
    }

    pub fn id(&mut self, kind: RequestKind) -> Result<String> {
        let label = format!("{:?}", kind).to_lowercase();
        self.ask_until(&format!("Enter the {} id: ", label), |answer| {
            if answer.is_empty() {
                Err("The id cannot be empty".to_string())
            } else {
                Ok(answer.to_string())
            }
        })
    }

    pub fn quality(&mut self) -> Result<QualityTier> {
        self.say("Quality:")?;
        for tier in QualityTier::ALL {
            self.say(&format!("[{}] {}", tier.ordinal(), tier.label()))?;
        }
        let default = QualityTier::default();
        self.ask_until(&format!("Choose a tier [{}]: ", default.ordinal()), |answer| {
            if answer.is_empty() {
                Ok(default)
            } else {
                answer.parse()
            }
        })
    }

    pub fn lyric_mode(&mut self) -> Result<LyricMode> {
        self.ask_until(
            "Lyrics: [1] embed only [2] embed and write a .lrc file [1]: ",
            |answer| {
                if answer.is_empty() {
                    Ok(LyricMode::default())
                } else {
                    answer.parse()
                }
            },
        )
    }

    pub fn concurrency(&mut self) -> Result<usize> {
        self.ask_until(
            &format!(
                "Parallel downloads (1-{}) [{}]: ",
                MAX_CONCURRENCY, DEFAULT_CONCURRENCY
            ),
            |answer| {
                if answer.is_empty() {
                    Ok(DEFAULT_CONCURRENCY)
                } else {
                    parse_concurrency(answer)
                }
            },
        )
    }

    /// Fill in a missing API URL or cookie. Returns true when `file` changed.
    pub fn complete_config(&mut self, file: &mut ConfigFile) -> Result<bool> {
        let mut changed = false;

        if file.ncmapi.as_deref().map_or(true, |s| s.trim().is_empty()) {
            let url = self.ask_until("API base URL: ", |answer| {
                if answer.is_empty() {
                    Err("The API URL cannot be empty".to_string())
                } else {
                    Ok(answer.to_string())
                }
            })?;
            file.ncmapi = Some(url);
            changed = true;
        }

        if file.cookie.is_none() {
            file.cookie = Some(self.ask("Cookie (leave empty to browse anonymously): ")?);
            changed = true;
        }

        Ok(changed)
    }

    /// Merge flags, config defaults and answers into the choices for a run.
    pub fn choices(&mut self, args: &Args, file: &ConfigFile) -> Result<RunChoices> {
        let kind = match args.kind {
            Some(kind) => kind,
            None => self.kind()?,
        };
        let id = match args.id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            Some(_) => bail!("--id cannot be empty"),
            None => self.id(kind)?,
        };

        let quality = match args.quality.or(file.quality) {
            Some(quality) => quality,
            None => self.quality()?,
        };

        let configured_mode = match file.lyric_mode.as_deref() {
            Some(raw) => Some(
                raw.parse::<LyricMode>()
                    .map_err(anyhow::Error::msg)
                    .context("Invalid lyric_mode in config file")?,
            ),
            None => None,
        };
        let lyric_mode = match args.lyrics.or(configured_mode) {
            Some(mode) => mode,
            None => self.lyric_mode()?,
        };

        let concurrency = match args.concurrency {
            Some(n) => n,
            None => match file.concurrency {
                Some(n) => parse_concurrency(&n.to_string())
                    .map_err(anyhow::Error::msg)
                    .context("Invalid concurrency in config file")?,
                None => self.concurrency()?,
            },
        };

        Ok(RunChoices {
            request: kind.into_request(id),
            quality,
            lyric_mode,
            concurrency,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn prompter(input: &str) -> Prompter<Cursor<Vec<u8>>, Vec<u8>> {
        Prompter::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    fn no_flags() -> Args {
        Args::parse_from(["ncm-downloader"])
    }

    #[test]
    fn test_parse_concurrency_range() {
        assert_eq!(parse_concurrency("1"), Ok(1));
        assert_eq!(parse_concurrency(" 50 "), Ok(50));
        assert!(parse_concurrency("0").is_err());
        assert!(parse_concurrency("51").is_err());
        assert!(parse_concurrency("many").is_err());
    }

    #[test]
    fn test_concurrency_reprompts_until_valid() {
        let mut p = prompter("0\n77\nten\n8\n");
        assert_eq!(p.concurrency().unwrap(), 8);

        let shown = String::from_utf8(p.output).unwrap();
        assert_eq!(shown.matches("Parallel downloads").count(), 4);
        assert!(shown.contains("between 1 and 50"));
    }

    #[test]
    fn test_empty_answers_take_defaults() {
        let mut p = prompter("\n\n\n");
        assert_eq!(p.quality().unwrap(), QualityTier::Exhigh);
        assert_eq!(p.lyric_mode().unwrap(), LyricMode::Embed);
        assert_eq!(p.concurrency().unwrap(), DEFAULT_CONCURRENCY);
    }

    #[test]
    fn test_interactive_choices() {
        let mut p = prompter("2\n  24381616 \nlossless\n2\n10\n");
        let choices = p.choices(&no_flags(), &ConfigFile::default()).unwrap();

        assert_eq!(
            choices.request,
            DownloadRequest::Collection {
                kind: CollectionKind::Playlist,
                id: "24381616".to_string()
            }
        );
        assert_eq!(choices.quality, QualityTier::Lossless);
        assert_eq!(choices.lyric_mode, LyricMode::EmbedAndFile);
        assert_eq!(choices.concurrency, 10);
    }

    #[test]
    fn test_flags_skip_prompts() {
        let args = Args::parse_from([
            "ncm-downloader",
            "--kind",
            "artist",
            "--id",
            "6452",
            "--quality",
            "5",
            "--lyrics",
            "file",
            "--concurrency",
            "3",
        ]);
        let mut p = prompter("");
        let choices = p.choices(&args, &ConfigFile::default()).unwrap();

        assert_eq!(
            choices.request,
            DownloadRequest::Collection {
                kind: CollectionKind::ArtistCatalog,
                id: "6452".to_string()
            }
        );
        assert_eq!(choices.quality, QualityTier::Hires);
        assert_eq!(choices.lyric_mode, LyricMode::EmbedAndFile);
        assert_eq!(choices.concurrency, 3);
        assert!(p.output.is_empty());
    }

    #[test]
    fn test_config_defaults_fill_gaps() {
        let args = Args::parse_from(["ncm-downloader", "-k", "song", "-i", "186016"]);
        let file = ConfigFile {
            quality: Some(QualityTier::Sky),
            lyric_mode: Some("embed".to_string()),
            concurrency: Some(4),
            ..Default::default()
        };
        let choices = prompter("").choices(&args, &file).unwrap();

        assert_eq!(choices.request, DownloadRequest::Song("186016".to_string()));
        assert_eq!(choices.quality, QualityTier::Sky);
        assert_eq!(choices.concurrency, 4);
    }

    #[test]
    fn test_out_of_range_config_concurrency_is_rejected() {
        let args = Args::parse_from(["ncm-downloader", "-k", "song", "-i", "1", "-q", "1", "-l", "embed"]);
        let file = ConfigFile {
            concurrency: Some(80),
            ..Default::default()
        };
        assert!(prompter("").choices(&args, &file).is_err());
    }

    #[test]
    fn test_flag_rejects_out_of_range_concurrency() {
        assert!(Args::try_parse_from(["ncm-downloader", "--concurrency", "0"]).is_err());
        assert!(Args::try_parse_from(["ncm-downloader", "--quality", "9"]).is_err());
    }

    #[test]
    fn test_complete_config_prompts_for_missing_values() {
        let mut file = ConfigFile::default();
        let mut p = prompter("\nhttp://localhost:3000\nMUSIC_U=abc\n");

        assert!(p.complete_config(&mut file).unwrap());
        assert_eq!(file.ncmapi.as_deref(), Some("http://localhost:3000"));
        assert_eq!(file.cookie.as_deref(), Some("MUSIC_U=abc"));
        assert!(file.is_complete());

        let mut p = prompter("");
        assert!(!p.complete_config(&mut file).unwrap());
    }

    #[test]
    fn test_closed_input_is_an_error() {
        assert!(prompter("").kind().is_err());
    }

    #[test]
    fn test_kind_menu() {
        let mut p = prompter("9\n4\n");
        assert_eq!(p.kind().unwrap(), RequestKind::Artist);
    }
}
