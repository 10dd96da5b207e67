use anyhow::{Context, Result};
use chrono::Utc;
use cine_studio::ai::{cancel_pair, CancelSignal, Canceller};
use cine_studio::app::Studio;
use cine_studio::models::{
    AspectRatio, Config, HistoryEntry, ImageAsset, MediaReference, ReferenceRole, VideoHandle,
    VideoModel,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "cine-studio")]
#[command(about = "Storyboard frames and Veo videos from a script")]
struct CliArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate four candidate starting frames.
    Frames {
        prompt: String,
        #[command(flatten)]
        references: ReferenceArgs,
    },
    /// Edit a single frame with natural-language instructions.
    Refine {
        #[arg(value_name = "IMAGE")]
        image: PathBuf,
        instructions: String,
    },
    /// Render a video from a script.
    Video {
        prompt: String,
        #[command(flatten)]
        references: ReferenceArgs,
        #[arg(long, value_enum, default_value_t = ModelArg::Fast)]
        model: ModelArg,
        #[arg(long, default_value = "16:9", value_parser = parse_aspect_arg)]
        aspect: AspectRatio,
        /// Image used as the first frame of the video.
        #[arg(long, value_name = "IMAGE")]
        start_frame: Option<PathBuf>,
    },
    /// Continue a previously generated video.
    Extend {
        prompt: String,
        /// Token file written next to an earlier video.
        #[arg(long, value_name = "JSON")]
        token: PathBuf,
        #[arg(long, default_value = "16:9", value_parser = parse_aspect_arg)]
        aspect: AspectRatio,
    },
}

#[derive(Debug, Args)]
struct ReferenceArgs {
    #[arg(long, value_name = "IMAGE")]
    character: Option<PathBuf>,
    #[arg(long, value_name = "IMAGE")]
    location: Option<PathBuf>,
    #[arg(long, value_name = "IMAGE")]
    prop: Option<PathBuf>,
    #[arg(long, value_name = "IMAGE")]
    style: Option<PathBuf>,
}

impl ReferenceArgs {
    fn load(&self) -> Result<Vec<MediaReference>> {
        [
            (&self.character, ReferenceRole::Character),
            (&self.location, ReferenceRole::Location),
            (&self.prop, ReferenceRole::Object),
            (&self.style, ReferenceRole::Style),
        ]
        .into_iter()
        .filter_map(|(path, role)| path.as_ref().map(|p| (p, role)))
        .map(|(path, role)| {
            MediaReference::from_file(path, role.default_label())
                .with_context(|| format!("Failed to read reference {}", path.display()))
        })
        .collect()
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModelArg {
    Fast,
    Pro,
}

impl From<ModelArg> for VideoModel {
    fn from(model: ModelArg) -> Self {
        match model {
            ModelArg::Fast => VideoModel::Fast,
            ModelArg::Pro => VideoModel::HighFidelity,
        }
    }
}

fn parse_aspect_arg(input: &str) -> std::result::Result<AspectRatio, String> {
    input.parse().map_err(|e: cine_studio::Error| e.to_string())
}

fn save_frames(output_dir: &Path, frames: &[ImageAsset]) -> Result<()> {
    let stamp = Utc::now().timestamp_millis();
    for (i, frame) in frames.iter().enumerate() {
        let path = output_dir.join(format!("frame_{}_{}.{}", stamp, i, frame.extension()));
        fs::write(&path, &frame.data)?;
        info!("Saved frame {} to {}", i, path.display());
    }
    Ok(())
}

/// Export the video and write its continuation token alongside it.
fn save_video(studio: &Studio, output_dir: &Path, entry: &HistoryEntry) -> Result<PathBuf> {
    let video_path = studio.export(output_dir)?;
    let token_path = video_path.with_extension("json");
    fs::write(&token_path, serde_json::to_string_pretty(&entry.result.video)?)?;
    info!("Saved continuation token to {}", token_path.display());
    Ok(video_path)
}

/// Exit status after SIGINT, following the shell convention of 128 + 2.
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Debug)]
enum Outcome<T> {
    Finished(T),
    Interrupted,
}

/// Run `work` until it finishes or `interrupt` fires; an interrupt also
/// cancels any video polling still in flight.
async fn until_interrupted<T>(
    work: impl Future<Output = T>,
    interrupt: impl Future<Output = ()>,
    canceller: &Canceller,
) -> Outcome<T> {
    tokio::select! {
        output = work => Outcome::Finished(output),
        _ = interrupt => {
            canceller.cancel();
            Outcome::Interrupted
        }
    }
}

async fn ctrl_c_pressed() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn run(command: Command, signal: CancelSignal) -> Result<()> {
    let config = Config::from_env()?;
    fs::create_dir_all(&config.output_dir)?;

    let studio = Studio::from_config(&config, Some(signal));

    match command {
        Command::Frames { prompt, references } => {
            studio.set_prompt(prompt);
            studio.set_references(references.load()?);
            let frames = studio.generate_frames().await?;
            if frames.is_empty() {
                warn!("The model returned no frames");
            }
            save_frames(&config.output_dir, &frames)?;
        }
        Command::Refine {
            image,
            instructions,
        } => {
            studio.load_start_frame(ImageAsset::from_file(&image)?);
            match studio.refine_frame(0, &instructions).await? {
                Some(refined) => save_frames(&config.output_dir, &[refined])?,
                None => warn!("The model returned no refined frame"),
            }
        }
        Command::Video {
            prompt,
            references,
            model,
            aspect,
            start_frame,
        } => {
            studio.set_prompt(prompt);
            studio.set_references(references.load()?);
            studio.select_model(model.into());
            studio.set_aspect_ratio(aspect);
            if let Some(path) = start_frame {
                studio.load_start_frame(ImageAsset::from_file(&path)?);
            }
            let entry = studio.generate_video().await?;
            let path = save_video(&studio, &config.output_dir, &entry)?;
            info!("Video ({}) written to {}", entry.model, path.display());
        }
        Command::Extend {
            prompt,
            token,
            aspect,
        } => {
            let previous: VideoHandle = serde_json::from_str(
                &fs::read_to_string(&token)
                    .with_context(|| format!("Failed to read token {}", token.display()))?,
            )?;
            studio.set_aspect_ratio(aspect);
            let entry = studio.extend_from(previous, &prompt).await?;
            let path = save_video(&studio, &config.output_dir, &entry)?;
            info!("Extended video written to {}", path.display());
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cine_studio=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting cine-studio");

    let args = CliArgs::parse();

    let (canceller, signal) = cancel_pair();
    match until_interrupted(run(args.command, signal), ctrl_c_pressed(), &canceller).await {
        Outcome::Finished(Ok(())) => {
            info!("Done");
            Ok(())
        }
        Outcome::Finished(Err(e)) => {
            error!("cine-studio failed: {:#}", e);
            std::process::exit(1);
        }
        Outcome::Interrupted => {
            warn!("Interrupted, stopping");
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_interrupt_abandons_pending_work_and_cancels_polling() {
        let (canceller, signal) = cancel_pair();
        let outcome = until_interrupted(
            std::future::pending::<Result<()>>(),
            std::future::ready(()),
            &canceller,
        )
        .await;

        assert!(matches!(outcome, Outcome::Interrupted));
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn test_finished_work_is_returned_without_cancelling() {
        let (canceller, signal) = cancel_pair();
        let outcome =
            until_interrupted(async { 7 }, std::future::pending::<()>(), &canceller).await;

        assert!(matches!(outcome, Outcome::Finished(7)));
        assert!(!signal.is_cancelled());
    }

    #[test]
    fn test_parse_aspect_arg_valid() {
        assert_eq!(parse_aspect_arg("9:16").unwrap(), AspectRatio::Portrait);
    }

    #[test]
    fn test_parse_aspect_arg_invalid() {
        let err = parse_aspect_arg("4:3").unwrap_err();
        assert!(err.contains("16:9"));
    }

    #[test]
    fn test_cli_parses_video_flags() {
        let args = CliArgs::try_parse_from([
            "cine-studio",
            "video",
            "A duel at dawn",
            "--character",
            "hero.png",
            "--model",
            "pro",
            "--aspect",
            "9:16",
        ])
        .unwrap();

        match args.command {
            Command::Video {
                prompt,
                references,
                model,
                aspect,
                start_frame,
            } => {
                assert_eq!(prompt, "A duel at dawn");
                assert_eq!(references.character, Some(PathBuf::from("hero.png")));
                assert_eq!(VideoModel::from(model), VideoModel::HighFidelity);
                assert_eq!(aspect, AspectRatio::Portrait);
                assert!(start_frame.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_missing_reference_file_is_reported() {
        let refs = ReferenceArgs {
            character: None,
            location: Some(PathBuf::from("/definitely/not/here.png")),
            prop: None,
            style: None,
        };
        let err = refs.load().unwrap_err();
        assert!(err.to_string().contains("not/here.png"));
    }
}
