//! Play a route file through the panorama engine and log each step.
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use mockable::DefaultClock;
use ortho_config::OrthoConfig;
use route_panorama::domain::ports::{
    FixturePanoramaSource, FixtureReverseGeocoder, PanoramaSource, ReverseGeocoder,
};
use route_panorama::domain::{
    AddressLookupService, PanoramaService, PlaybackController, PlaybackEvent, PlaybackSpeed,
    PlaybackState,
};
use route_panorama::outbound::nominatim::NominatimHttpGeocoder;
use route_panorama::outbound::path_file::PathFileProvider;
use route_panorama::outbound::streetview::{StreetViewConfig, StreetViewHttpSource};
use route_panorama::settings::EngineSettings;
use tokio::runtime::Builder;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

const ADDRESS_TIMEOUT: Duration = Duration::from_secs(10);

/// `route-preview` command arguments.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "route-preview",
    about = "Prefetch panoramas along a route file and play it back",
    version
)]
struct CliArgs {
    /// JSON `[{lat, lng}]` array or GeoJSON `LineString` file.
    #[arg(value_name = "path")]
    path: PathBuf,
    /// Playback speed: `slow`, `normal`, or `fast`. Overrides `PANORAMA_SPEED`.
    #[arg(long, value_name = "speed")]
    speed: Option<PlaybackSpeed>,
    /// Resolve a street address for each point as playback reaches it.
    #[arg(long)]
    addresses: bool,
    /// Use deterministic fixture providers instead of remote services.
    #[arg(long)]
    offline: bool,
    /// Emit logs as JSON lines.
    #[arg(long = "json-logs")]
    json_logs: bool,
}

fn main() -> io::Result<()> {
    let runtime = Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|error| io::Error::other(format!("create Tokio runtime: {error}")))?;
    runtime.block_on(async_main())
}

async fn async_main() -> io::Result<()> {
    let args = CliArgs::try_parse().map_err(io::Error::other)?;
    init_tracing(args.json_logs);

    let settings = EngineSettings::load_from_iter([OsString::from("route-preview")])
        .map_err(|error| io::Error::other(format!("load settings: {error}")))?;
    let speed = match args.speed {
        Some(speed) => speed,
        None => settings.speed().map_err(io::Error::other)?,
    };
    let service_config = settings
        .panorama_service_config()
        .map_err(io::Error::other)?;
    let playback_config = settings.playback_config().map_err(io::Error::other)?;

    let source = build_panorama_source(&settings, service_config.fetch_timeout, args.offline)?;
    let service = Arc::new(PanoramaService::new(
        source,
        Arc::new(DefaultClock),
        service_config,
    ));
    let addresses = if args.addresses {
        Some(build_address_lookup(&settings, args.offline)?)
    } else {
        None
    };

    let controller = PlaybackController::new(Arc::clone(&service), playback_config);
    let mut events = controller.events();
    let provider = PathFileProvider::new(args.path);
    controller
        .load_from(&provider, speed)
        .await
        .map_err(|error| io::Error::other(format!("load route: {error}")))?;
    info!(
        path = %provider.path().display(),
        points = controller.snapshot().point_count,
        %speed,
        "route loaded"
    );

    loop {
        match events.recv().await {
            Ok(PlaybackEvent::StateChanged { from, to }) => {
                info!(%from, %to, "playback state changed");
                match to {
                    PlaybackState::Playing if from.is_initializing() => {
                        report_point(&controller, 0, addresses.as_ref()).await;
                    }
                    PlaybackState::Completed => break,
                    PlaybackState::Failed { message } => {
                        return Err(io::Error::other(format!("playback failed: {message}")));
                    }
                    _ => {}
                }
            }
            Ok(PlaybackEvent::IndexAdvanced { index }) => {
                report_point(&controller, index, addresses.as_ref()).await;
            }
            Ok(PlaybackEvent::PointResolved {
                index,
                has_scene,
                failed,
            }) => {
                debug!(index, has_scene, failed, "point resolved");
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "playback events dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }

    let statistics = service.cache_statistics();
    info!(
        cached = statistics.entry_count,
        capacity = statistics.max_entries,
        "playback finished"
    );
    Ok(())
}

fn init_tracing(json: bool) {
    let builder = fmt().with_env_filter(EnvFilter::from_default_env());
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if let Err(error) = result {
        warn!(error = %error, "tracing init failed");
    }
}

fn build_panorama_source(
    settings: &EngineSettings,
    timeout: Duration,
    offline: bool,
) -> io::Result<Arc<dyn PanoramaSource>> {
    let api_key = match (offline, settings.street_view_api_key()) {
        (false, Some(key)) => key,
        (false, None) => {
            warn!("PANORAMA_STREET_VIEW_API_KEY is not set; using fixture panoramas");
            return Ok(Arc::new(FixturePanoramaSource));
        }
        (true, _) => return Ok(Arc::new(FixturePanoramaSource)),
    };
    let endpoint = settings
        .street_view_endpoint()
        .map_err(io::Error::other)?;
    let source = StreetViewHttpSource::new(StreetViewConfig::new(endpoint, api_key), timeout)
        .map_err(|error| io::Error::other(format!("create Street View client: {error}")))?;
    Ok(Arc::new(source))
}

fn build_address_lookup(
    settings: &EngineSettings,
    offline: bool,
) -> io::Result<AddressLookupService> {
    let geocoder: Arc<dyn ReverseGeocoder> = if offline {
        Arc::new(FixtureReverseGeocoder)
    } else {
        let endpoint = settings.nominatim_endpoint().map_err(io::Error::other)?;
        let geocoder = NominatimHttpGeocoder::new(
            endpoint,
            settings.user_agent(),
            ADDRESS_TIMEOUT,
        )
        .map_err(|error| io::Error::other(format!("create Nominatim client: {error}")))?;
        Arc::new(geocoder)
    };
    Ok(AddressLookupService::new(
        geocoder,
        Arc::new(DefaultClock),
        settings.address_lookup_config(),
    ))
}

async fn report_point(
    controller: &PlaybackController,
    index: usize,
    addresses: Option<&AddressLookupService>,
) {
    let Some(point) = controller.point(index) else {
        return;
    };
    let address = match addresses {
        Some(lookup) => lookup.address_for(point.coordinate).await,
        None => None,
    };
    let pano_id = point.scene.as_ref().map(|scene| scene.pano_id.as_str());
    info!(
        index,
        total = controller.snapshot().point_count,
        coordinate = %point.coordinate,
        pano_id,
        address = address.as_deref(),
        failed = point.fetch_failed,
        "camera moved"
    );
}
