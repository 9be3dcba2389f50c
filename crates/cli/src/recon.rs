//! `rsign refresh` and `rsign validate`.

use std::io::{self, Write};
use std::path::Path;

use roadsigns_feeds::{AppConfig, FeedMode};
use roadsigns_recon::RefreshSummary;

use crate::exit_codes::EXIT_OUTPUT;
use crate::{mode_label, CliError};

pub fn cmd_refresh(config: &AppConfig, json: bool) -> Result<(), CliError> {
    let service = config.open_service()?;
    let summary = service.refresh()?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if json {
        let text = serde_json::to_string_pretty(&summary)
            .map_err(|e| CliError::new(EXIT_OUTPUT, e.to_string()))?;
        writeln!(out, "{text}").map_err(|e| CliError::new(EXIT_OUTPUT, e.to_string()))?;
    } else {
        print_summary(&mut out, &summary).map_err(|e| CliError::new(EXIT_OUTPUT, e.to_string()))?;
    }
    Ok(())
}

fn print_summary(out: &mut impl Write, summary: &RefreshSummary) -> io::Result<()> {
    writeln!(
        out,
        "{} entities: {} new, {} updated, {} conflict, {} removed",
        summary.entity_count,
        summary.new_count,
        summary.updated_count,
        summary.conflict_count,
        summary.removed_count
    )?;
    if summary.evicted_count > 0 {
        writeln!(out, "{} removed entities dropped", summary.evicted_count)?;
    }
    if !summary.changed {
        writeln!(out, "no changes since the last pass")?;
    }
    for warning in &summary.warnings {
        writeln!(out, "warning: {warning}")?;
    }
    Ok(())
}

pub fn cmd_validate(config: &AppConfig, path: Option<&Path>, json: bool) -> Result<(), CliError> {
    config.validate()?;
    let state = config.feeds.state_path()?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let write_err = |e: io::Error| CliError::new(EXIT_OUTPUT, e.to_string());

    if json {
        let text = serde_json::to_string_pretty(config)
            .map_err(|e| CliError::new(EXIT_OUTPUT, e.to_string()))?;
        writeln!(out, "{text}").map_err(write_err)?;
        return Ok(());
    }

    let origin = match path {
        Some(p) => format!("{} (ok)", p.display()),
        None => "built-in defaults".to_string(),
    };
    writeln!(out, "config: {origin}").map_err(write_err)?;

    let feeds = &config.feeds;
    let source_line = match feeds.mode {
        FeedMode::Mock => "built-in demo data".to_string(),
        FeedMode::Live => format!(
            "{} + {{{}, {}}}",
            feeds.api_base.as_deref().unwrap_or_default(),
            feeds.authority_path,
            feeds.commercial_path
        ),
        FeedMode::File => format!(
            "{} / {}",
            feeds.authority_file.as_deref().map(|p| p.display().to_string()).unwrap_or_default(),
            feeds.commercial_file.as_deref().map(|p| p.display().to_string()).unwrap_or_default()
        ),
    };
    let engine = &config.engine;
    writeln!(out, "feeds:  {} ({source_line})", mode_label(feeds.mode)).map_err(write_err)?;
    writeln!(out, "state:  {}", state.display()).map_err(write_err)?;
    writeln!(
        out,
        "engine: link < {} m, name similarity >= {}, conflict > {} m, timeout {} s",
        engine.matching.link_distance_m,
        engine.matching.name_similarity,
        engine.conflict.position_tolerance_m,
        engine.fetch.timeout_secs
    )
    .map_err(write_err)?;
    Ok(())
}
