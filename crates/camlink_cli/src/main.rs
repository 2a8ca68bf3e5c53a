use std::env;
use std::iter;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use camlink_core::host::memory::{InMemorySink, InMemorySource};
use camlink_core::{
    export_camera, import_camera, print_debug, reload, CameraLinkConfig, ExportRequest, MetadataPolicy, Resolution,
};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};

#[derive(Debug, PartialEq)]
enum Command {
    Export {
        scene: PathBuf,
        output: PathBuf,
        camera: Option<String>,
        start: Option<i64>,
        end: Option<i64>,
        step: Option<i64>,
        aspect_match: bool,
        resolution: Option<Resolution>,
    },
    Import {
        path: PathBuf,
        strict: bool,
    },
    Inspect {
        path: PathBuf,
    },
    Reload {
        path: PathBuf,
    },
}

#[derive(Debug, PartialEq)]
struct Args {
    config: Option<PathBuf>,
    command: Command,
}

fn document_arg() -> Arg<'static, 'static> {
    Arg::with_name("DOCUMENT")
        .help("Interchange document (.usda)")
        .required(true)
        .index(1)
}

fn frame_arg(name: &'static str, help: &'static str) -> Arg<'static, 'static> {
    Arg::with_name(name)
        .long(name)
        .takes_value(true)
        .allow_hyphen_values(true)
        .help(help)
}

fn app() -> App<'static, 'static> {
    App::new("camlink")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Moves an animated camera between hosts through a USDA document")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(Arg::with_name("config")
            .long("config")
            .takes_value(true)
            .value_name("FILE")
            .help("JSON configuration file"))
        .subcommand(SubCommand::with_name("export")
            .about("Samples a camera from a JSON source scene and writes a document")
            .arg(Arg::with_name("SCENE")
                .help("Source scene (.json)")
                .required(true)
                .index(1))
            .arg(Arg::with_name("OUTPUT")
                .help("Document to write (.usda)")
                .required(true)
                .index(2))
            .arg(Arg::with_name("camera")
                .long("camera")
                .takes_value(true)
                .help("Camera transform or shape name (defaults to the selection)"))
            .arg(frame_arg("start", "First frame (defaults to the playback start)"))
            .arg(frame_arg("end", "Last frame (defaults to the playback end)"))
            .arg(frame_arg("step", "Frame step"))
            .arg(Arg::with_name("aspect-match")
                .long("aspect-match")
                .help("Derive the vertical aperture from the render resolution"))
            .arg(Arg::with_name("resolution")
                .long("resolution")
                .takes_value(true)
                .value_name("WxH")
                .help("Render resolution for aspect matching; implies --aspect-match")))
        .subcommand(SubCommand::with_name("import")
            .about("Imports a document into a new timeline container")
            .arg(document_arg())
            .arg(Arg::with_name("strict")
                .long("strict")
                .help("Fail when the document has no metadata block")))
        .subcommand(SubCommand::with_name("inspect")
            .about("Prints sample counts, range and metadata of a document")
            .arg(document_arg()))
        .subcommand(SubCommand::with_name("reload")
            .about("Imports a document, then reloads it against the same stage")
            .arg(document_arg()))
}

fn frame(matches: &ArgMatches, name: &str) -> Result<Option<i64>> {
    matches
        .value_of(name)
        .map(|v| v.parse::<i64>().with_context(|| format!("--{} expects an integer, got '{}'", name, v)))
        .transpose()
}

fn document(matches: &ArgMatches) -> PathBuf {
    PathBuf::from(matches.value_of("DOCUMENT").unwrap_or_default())
}

fn parse_args(args: &[String]) -> Result<Args> {
    let argv = iter::once("camlink".to_string()).chain(args.iter().cloned());
    let matches = app().get_matches_from_safe(argv)?;

    let command = match matches.subcommand() {
        ("export", Some(export)) => Command::Export {
            scene: PathBuf::from(export.value_of("SCENE").unwrap_or_default()),
            output: PathBuf::from(export.value_of("OUTPUT").unwrap_or_default()),
            camera: export.value_of("camera").map(str::to_string),
            start: frame(export, "start")?,
            end: frame(export, "end")?,
            step: frame(export, "step")?,
            aspect_match: export.is_present("aspect-match") || export.is_present("resolution"),
            resolution: export
                .value_of("resolution")
                .map(|v| v.parse::<Resolution>().map_err(|e| anyhow!(e)))
                .transpose()?,
        },
        ("import", Some(import)) => Command::Import {
            path: document(import),
            strict: import.is_present("strict"),
        },
        ("inspect", Some(inspect)) => Command::Inspect { path: document(inspect) },
        ("reload", Some(reload)) => Command::Reload { path: document(reload) },
        (other, _) => return Err(anyhow!("Unknown command: '{}'", other)),
    };

    Ok(Args {
        config: matches.value_of("config").map(PathBuf::from),
        command,
    })
}

fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => CameraLinkConfig::load(path)?,
        None => CameraLinkConfig::default(),
    };

    match args.command {
        Command::Export {
            scene,
            output,
            camera,
            start,
            end,
            step,
            aspect_match,
            resolution,
        } => {
            let mut source = InMemorySource::load(&scene)?;
            let request = ExportRequest {
                camera,
                path: output,
                start,
                end,
                step,
                aspect_match: aspect_match.then_some(true),
                resolution,
                cancel: None,
            };
            let summary = export_camera(&mut source, &request, &config)?;
            println!(
                "Exported {} ({} samples, {}-{} step {} @ {} fps) to {}",
                summary.prim_path,
                summary.sample_count,
                summary.range.start,
                summary.range.end,
                summary.range.step,
                summary.fps,
                summary.path.display()
            );
        }
        Command::Import { path, strict } => {
            if strict {
                config.metadata_policy = MetadataPolicy::Strict;
            }
            let mut sink = InMemorySink::new();
            let outcome = import_camera(&mut sink, &path, &config)?;
            let container = sink
                .container(outcome.container)
                .ok_or_else(|| anyhow!("{} vanished after import", outcome.container))?;

            println!("Imported {} into '{}'", outcome.prim_path, container.name);
            println!(
                "  Playback: {}-{} @ {} fps ({})",
                container.settings.start, container.settings.end, container.settings.fps, container.settings.display_rate
            );
            println!(
                "  View: {}-{}",
                container.settings.view_start, container.settings.view_end
            );
            if outcome.degraded {
                println!("  Warning: no metadata block, range and rate derived from the stage");
            }
        }
        Command::Inspect { path } => {
            let report = print_debug(&path)?;
            println!("{}", report);
        }
        Command::Reload { path } => {
            let mut sink = InMemorySink::new();
            let outcome = import_camera(&mut sink, &path, &config)?;
            let container = reload(&mut sink, outcome.stage, &config)?;
            let settings = sink
                .container(container)
                .map(|c| c.settings)
                .ok_or_else(|| anyhow!("{} vanished after reload", container))?;

            println!(
                "Reloaded {} -> {}: {}-{} @ {} fps",
                path.display(),
                container,
                settings.start,
                settings.end,
                settings.fps
            );
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let argv: Vec<String> = env::args().skip(1).collect();
    let args = match parse_args(&argv) {
        Ok(args) => args,
        Err(err) => match err.downcast::<clap::Error>() {
            // Help, version and usage errors print themselves
            Ok(usage) => usage.exit(),
            Err(err) => return Err(err),
        },
    };
    log::debug!("{:?}", args);

    run(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn test_parse_export() {
        let parsed = parse_args(&args(
            "export scene.json out.usda --camera shotCam --start 1001 --end 1100 --resolution 2048x858",
        ))
        .unwrap();

        assert_eq!(parsed.config, None);
        assert_eq!(
            parsed.command,
            Command::Export {
                scene: "scene.json".into(),
                output: "out.usda".into(),
                camera: Some("shotCam".into()),
                start: Some(1001),
                end: Some(1100),
                step: None,
                aspect_match: true,
                resolution: Some(Resolution::new(2048, 858)),
            }
        );
    }

    #[test]
    fn test_parse_import_with_config() {
        let parsed = parse_args(&args("--config cl.json import cam.usda --strict")).unwrap();
        assert_eq!(parsed.config, Some(PathBuf::from("cl.json")));
        assert_eq!(
            parsed.command,
            Command::Import {
                path: "cam.usda".into(),
                strict: true
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_args(&args("export scene.json")).is_err());
        assert!(parse_args(&args("inspect a.usda --bogus")).is_err());
        assert!(parse_args(&args("export s.json o.usda --step two")).is_err());
        assert!(parse_args(&args("export s.json o.usda --resolution 0x0")).is_err());
        assert!(parse_args(&args("")).is_err());
    }

    #[test]
    fn test_parse_negative_frames_and_reload() {
        let parsed = parse_args(&args("export s.json o.usda --start -10 --end 20 --step 5 --aspect-match")).unwrap();
        assert!(matches!(
            parsed.command,
            Command::Export {
                start: Some(-10),
                end: Some(20),
                step: Some(5),
                aspect_match: true,
                resolution: None,
                ..
            }
        ));

        let parsed = parse_args(&args("reload cam.usda")).unwrap();
        assert_eq!(parsed.command, Command::Reload { path: "cam.usda".into() });
    }
}
