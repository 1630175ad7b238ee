use gas_label_bridge::{
    analyzer::AnalyzerLink,
    ble::{LinkConfig, PrinterIdentity, PrinterLink},
    config::{Args, UI_LOG_FILE},
    db::Database,
    label::{self, OutlineFont},
    printer::{BuiltinFont, LabelSize, LabelType, PrintConfig, PrintQueue, Session, Typeface},
    station::Station,
    ui::App,
};

use std::fs::OpenOptions;
use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::Parser;
use pretty_env_logger::env_logger::Target;

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let mut builder = pretty_env_logger::formatted_timed_builder();

    match std::env::var("RUST_LOG") {
        Ok(filter) => builder.parse_filters(&filter),
        Err(_) => builder.parse_filters(&args.log_level),
    };

    // The terminal UI owns the screen, so its log goes to a file.
    let log_file = match (&args.log_file, args.no_ui) {
        (Some(path), _) => Some(path.clone()),
        (None, false) => Some(PathBuf::from(UI_LOG_FILE)),
        (None, true) => None,
    };

    if let Some(path) = log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open the log file {}", path.display()))?;

        builder.target(Target::Pipe(Box::new(file)));
    }

    builder.try_init()?;

    Ok(())
}

fn load_font(args: &Args) -> Box<dyn Typeface> {
    if args.builtin_font {
        return Box::new(BuiltinFont);
    }

    let font = match &args.font {
        Some(path) => OutlineFont::from_file(path, args.font_family.clone()),
        None => OutlineFont::system(args.font_family.clone()),
    };

    match font {
        Ok(font) => Box::new(font),

        Err(err) => {
            log::warn!("No outline font ({err}), using the built-in font.");
            Box::new(BuiltinFont)
        }
    }
}

#[cfg(feature = "bluetooth")]
fn spawn_link(identity: PrinterIdentity, print_config: PrintConfig, session: Session) -> PrinterLink {
    use gas_label_bridge::ble::BtleBackend;

    PrinterLink::spawn(
        BtleBackend::new,
        identity,
        LinkConfig::default(),
        print_config,
        session,
    )
}

#[cfg(not(feature = "bluetooth"))]
fn spawn_link(identity: PrinterIdentity, print_config: PrintConfig, session: Session) -> PrinterLink {
    use gas_label_bridge::ble::{Error, Unavailable};

    log::error!("Built without Bluetooth support, the printer cannot be reached.");

    PrinterLink::spawn(
        |_| Err::<Unavailable, _>(Error::NoAdapter),
        identity,
        LinkConfig::default(),
        print_config,
        session,
    )
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    // The demo card only needs the raster, no hardware.
    if args.demo {
        let path = args
            .preview
            .as_ref()
            .ok_or_else(|| anyhow!("--demo needs --preview"))?;

        label::compose_demo(LabelSize::default())
            .to_image()
            .save(path)
            .with_context(|| format!("Failed to save the demo label to {}", path.display()))?;

        log::info!("Demo label written to {}.", path.display());
        return Ok(());
    }

    let font = load_font(&args);

    let db = Database::open_or_create(&args.db)
        .with_context(|| format!("Failed to open the database {}", args.db.display()))?;

    let analyzer = match &args.serial_port {
        Some(port) => AnalyzerLink::on_serial_port(port),
        None => AnalyzerLink::on_usb(),
    };

    let print_config = PrintConfig {
        density: args.density,
        label_type: if args.continuous {
            LabelType::Continuous
        } else {
            LabelType::WithGaps
        },
        ..PrintConfig::default()
    };

    let session = Session::new();
    let identity = PrinterIdentity::new(args.printer_name.clone(), args.printer_address.clone());
    let link = spawn_link(identity, print_config, session.clone());
    let queue = PrintQueue::spawn(session);

    let mut station = Station::new(analyzer, link, queue, font, db).with_preview(args.preview.clone());

    if let Some(name) = &args.name {
        station
            .use_name(name)
            .with_context(|| format!("Failed to select the name {name:?}"))?;
    }

    let result = if args.no_ui {
        App::run_headless(station)
    } else {
        App::run(station)
    };

    result.map_err(|err| anyhow!("{err}"))
}
