use std::{
    fs,
    path::{Path, PathBuf},
};

use clap::{Args, Parser, Subcommand};
use reqwest::Client;
use thiserror::Error;
use url::Url;

use requerimiento_api::{RegistroClient, RegistroReceipt};
use requerimiento_core::{AudioMediaType, Coordinates, Requerimiento, AVAILABLE_AGENCIES};

use crate::form::{FormError, RequerimientoForm};
use crate::location::{FixedLocation, LocationProvider, NoLocation};

/// requerimiento - register citizen-service requests
#[derive(Debug, Parser)]
#[command(name = "requerimiento")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the local development proxy
    Proxy,
    /// Validate and register one requerimiento
    Submit(SubmitArgs),
}

#[derive(Debug, Args)]
pub struct SubmitArgs {
    /// JSON document keyed by the endpoint field names
    #[arg(short, long, value_name = "FILE")]
    pub record: PathBuf,

    /// Voice note sent as `nota_voz`
    #[arg(short, long, value_name = "FILE")]
    pub audio: Option<PathBuf>,

    /// Media type of the voice note (guessed from the extension by default)
    #[arg(long, value_name = "TYPE", requires = "audio")]
    pub audio_type: Option<String>,

    /// Toggle a responsible agency from the form catalogue; repeatable
    #[arg(long = "agency", value_name = "NAME")]
    pub agencies: Vec<String>,

    /// Current latitude
    #[arg(long, requires = "lng", allow_negative_numbers = true)]
    pub lat: Option<f64>,

    /// Current longitude
    #[arg(long, requires = "lat", allow_negative_numbers = true)]
    pub lng: Option<f64>,

    /// Registration API root, overriding API_BASE_URL
    #[arg(long, value_name = "URL")]
    pub base_url: Option<Url>,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid record document {path}: {source}")]
    ParseRecord {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("cannot tell the audio type of {0}; pass --audio-type")]
    UnknownAudioType(PathBuf),
    #[error("unknown agency {0:?}; expected one of: {}", AVAILABLE_AGENCIES.join(", "))]
    UnknownAgency(String),
    #[error("failed to build http client: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{}", .0.user_message())]
    Form(#[from] FormError),
}

struct AudioFile {
    file_name: String,
    media_type: String,
    bytes: Vec<u8>,
}

/// Runs the form flow once: locate, attach, validate, register.
pub async fn run_submit(
    args: SubmitArgs,
    default_base_url: &Url,
) -> Result<RegistroReceipt, CliError> {
    if let Some(unknown) = args
        .agencies
        .iter()
        .find(|agency| !AVAILABLE_AGENCIES.contains(&agency.as_str()))
    {
        return Err(CliError::UnknownAgency(unknown.clone()));
    }
    let draft = load_record(&args.record)?;
    let audio = args
        .audio
        .as_ref()
        .map(|path| load_audio(path, args.audio_type.as_deref()))
        .transpose()?;
    let base_url = args.base_url.clone().unwrap_or_else(|| default_base_url.clone());
    let client = RegistroClient::new(base_url, Client::builder().build()?);

    match (args.lat, args.lng) {
        (Some(lat), Some(lng)) => {
            let location = FixedLocation(Coordinates::new(lat, lng));
            submit_with(location, true, draft, audio, &args.agencies, client).await
        }
        _ => submit_with(NoLocation, false, draft, audio, &args.agencies, client).await,
    }
}

async fn submit_with<L: LocationProvider>(
    location: L,
    has_fix: bool,
    draft: Requerimiento,
    audio: Option<AudioFile>,
    agencies: &[String],
    client: RegistroClient,
) -> Result<RegistroReceipt, CliError> {
    let mut form = RequerimientoForm::new(draft, location, client);
    if has_fix || form.draft().coords.is_none() {
        form.locate().await.map_err(FormError::from)?;
    }
    for agency in agencies {
        form.toggle_agency(agency);
    }
    if let Some(audio) = audio {
        form.attach_audio(audio.file_name, &audio.media_type, audio.bytes)?;
    }
    Ok(form.submit().await?)
}

fn load_record(path: &Path) -> Result<Requerimiento, CliError> {
    let raw = fs::read_to_string(path).map_err(|source| CliError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| CliError::ParseRecord {
        path: path.to_path_buf(),
        source,
    })
}

fn load_audio(path: &Path, media_type: Option<&str>) -> Result<AudioFile, CliError> {
    let media_type = match media_type {
        Some(value) => value.to_string(),
        None => path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(AudioMediaType::from_extension)
            .map(|media| media.as_str().to_string())
            .ok_or_else(|| CliError::UnknownAudioType(path.to_path_buf()))?,
    };
    let bytes = fs::read(path).map_err(|source| CliError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("nota_voz")
        .to_string();
    Ok(AudioFile {
        file_name,
        media_type,
        bytes,
    })
}
