use anyhow::Context;
use clap::Parser;
use ocr_sheet::{
    config::Settings,
    pipeline::{self, Outcome},
    selector::{ImageSelector, PathSelector},
};
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::parse();
    let writer = settings.output_writer();
    writer.ensure_dirs().with_context(|| {
        format!(
            "creating output directories under {}",
            settings.base_dir().display()
        )
    })?;

    let mut selector = selector_for(&settings)?;
    let engine = settings.engine_builder();
    let outcome = pipeline::run(
        selector.as_mut(),
        &engine,
        &writer,
        &settings.line_ordering(),
    )?;

    if let Outcome::Written { rows, .. } = outcome {
        log::debug!("Wrote {rows} rows");
    }
    Ok(())
}

fn selector_for(settings: &Settings) -> anyhow::Result<Box<dyn ImageSelector>> {
    if let Some(image) = &settings.image {
        return Ok(Box::new(PathSelector::new(image)));
    }
    #[cfg(feature = "dialog")]
    {
        Ok(Box::new(ocr_sheet::selector::DialogSelector::new()))
    }
    #[cfg(not(feature = "dialog"))]
    {
        anyhow::bail!("built without the `dialog` feature; pass an IMAGE path")
    }
}
