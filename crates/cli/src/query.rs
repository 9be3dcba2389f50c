//! `rsign list`, `rsign export`, `rsign summary`: read-only views of the
//! committed snapshot. None of them fetch.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::{Args, ValueEnum};
use serde::Serialize;

use roadsigns_feeds::AppConfig;
use roadsigns_recon::{
    FilterSpec, PageSpec, ReconService, ReconciledEntity, SignStatus, SortDirection, SortKey,
    SortSpec, SourceFilter,
};

use crate::exit_codes::EXIT_OUTPUT;
use crate::CliError;

#[derive(Clone, Copy, ValueEnum)]
pub enum SourceArg {
    All,
    /// Authority side present
    Authority,
    /// Commercial side present
    Commercial,
    /// Both sides present
    Both,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum StatusArg {
    New,
    Updated,
    Conflict,
    Removed,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum SortArg {
    Name,
    /// Number of registries reporting the sign
    Sources,
    /// removed < conflict < updated < new
    Status,
    /// Latitude, then longitude
    Position,
}

/// Filter and sort options shared by the read commands.
#[derive(Args)]
pub struct SelectArgs {
    /// Which registries must report the sign
    #[arg(long, value_enum, default_value = "all")]
    source: SourceArg,

    /// Keep only these statuses. Repeatable
    #[arg(long = "status", value_enum)]
    statuses: Vec<StatusArg>,

    /// Case-insensitive substring of the sign name
    #[arg(long, short = 'q', default_value = "")]
    search: String,

    #[arg(long, value_enum, default_value = "name")]
    sort: SortArg,

    /// Sort descending
    #[arg(long)]
    desc: bool,
}

impl SelectArgs {
    fn filter(&self) -> FilterSpec {
        FilterSpec {
            source: match self.source {
                SourceArg::All => SourceFilter::All,
                SourceArg::Authority => SourceFilter::AuthorityOnly,
                SourceArg::Commercial => SourceFilter::CommercialOnly,
                SourceArg::Both => SourceFilter::Both,
            },
            statuses: self
                .statuses
                .iter()
                .map(|s| match s {
                    StatusArg::New => SignStatus::New,
                    StatusArg::Updated => SignStatus::Updated,
                    StatusArg::Conflict => SignStatus::Conflict,
                    StatusArg::Removed => SignStatus::Removed,
                })
                .collect(),
            search_query: self.search.clone(),
        }
    }

    fn sort(&self) -> SortSpec {
        let key = match self.sort {
            SortArg::Name => SortKey::Name,
            SortArg::Sources => SortKey::SourceRichness,
            SortArg::Status => SortKey::StatusWeight,
            SortArg::Position => SortKey::Position,
        };
        let direction = if self.desc {
            SortDirection::Descending
        } else {
            SortDirection::Ascending
        };
        SortSpec::new(key, direction)
    }
}

#[derive(Args)]
pub struct ListArgs {
    #[command(flatten)]
    select: SelectArgs,

    /// Zero-based page index
    #[arg(long, default_value_t = 0)]
    page: usize,

    #[arg(long, default_value = "50")]
    page_size: NonZeroUsize,

    /// Print the page as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
pub struct ExportArgs {
    #[command(flatten)]
    select: SelectArgs,

    /// Output file (omit or `-` for stdout)
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,
}

#[derive(Args)]
pub struct SummaryArgs {
    #[command(flatten)]
    select: SelectArgs,

    #[arg(long)]
    json: bool,
}

fn output_err(e: impl std::fmt::Display) -> CliError {
    CliError::new(EXIT_OUTPUT, e.to_string())
}

fn open(config: &AppConfig) -> Result<ReconService, CliError> {
    let service = config.open_service()?;
    if service.snapshot().committed_at.is_none() {
        log::warn!("no committed snapshot yet; run `rsign refresh` first");
    }
    Ok(service)
}

// ============================================================================
// list
// ============================================================================

#[derive(Serialize)]
struct ListPage<'a> {
    page: usize,
    page_size: usize,
    total_count: usize,
    items: &'a [ReconciledEntity],
}

pub fn cmd_list(config: &AppConfig, args: ListArgs) -> Result<(), CliError> {
    let service = open(config)?;
    let page = PageSpec::new(args.page, args.page_size);
    let result = service.get_entities(&args.select.filter(), &args.select.sort(), page);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if args.json {
        let body = ListPage {
            page: args.page,
            page_size: args.page_size.get(),
            total_count: result.total_count,
            items: &result.items,
        };
        let text = serde_json::to_string_pretty(&body).map_err(output_err)?;
        writeln!(out, "{text}").map_err(output_err)?;
        return Ok(());
    }

    writeln!(
        out,
        "{:>5}  {:<8}  {:<10}  {:>10}  {:>10}  NAME",
        "ID", "STATUS", "SOURCE", "LAT", "LON"
    )
    .map_err(output_err)?;
    for e in &result.items {
        writeln!(
            out,
            "{:>5}  {:<8}  {:<10}  {:>10.6}  {:>10.6}  {}{}",
            e.id.0,
            e.status,
            e.coverage(),
            e.position.lat,
            e.position.lon,
            e.name,
            if e.flagged { "  [flagged]" } else { "" }
        )
        .map_err(output_err)?;
    }

    let first = args.page * args.page_size.get();
    if result.items.is_empty() {
        writeln!(out, "no entities on this page ({} match)", result.total_count)
    } else {
        writeln!(
            out,
            "showing {}-{} of {}",
            first + 1,
            first + result.items.len(),
            result.total_count
        )
    }
    .map_err(output_err)
}

// ============================================================================
// export
// ============================================================================

pub fn cmd_export(config: &AppConfig, args: ExportArgs) -> Result<(), CliError> {
    let service = open(config)?;
    let filter = args.select.filter();
    let sort = args.select.sort();

    match args.output.filter(|p| p.as_os_str() != "-") {
        Some(path) => {
            let file = File::create(&path).map_err(|e| {
                CliError::new(EXIT_OUTPUT, format!("cannot create {}: {e}", path.display()))
                    .with_hint("use `-o -` to write to stdout")
            })?;
            let rows = service.export_csv(&filter, &sort, BufWriter::new(file))?;
            eprintln!("exported {rows} signs to {}", path.display());
        }
        None => {
            let stdout = io::stdout();
            service.export_csv(&filter, &sort, stdout.lock())?;
        }
    }
    Ok(())
}

// ============================================================================
// summary
// ============================================================================

pub fn cmd_summary(config: &AppConfig, args: SummaryArgs) -> Result<(), CliError> {
    let service = open(config)?;
    let tally = service.tally(&args.select.filter());
    let snapshot = service.snapshot();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if args.json {
        let body = serde_json::json!({
            "committed_at": snapshot.committed_at,
            "tally": tally,
        });
        let text = serde_json::to_string_pretty(&body).map_err(output_err)?;
        return writeln!(out, "{text}").map_err(output_err);
    }

    match snapshot.committed_at {
        Some(at) => writeln!(out, "snapshot committed {}", at.to_rfc3339()),
        None => writeln!(out, "no snapshot committed yet"),
    }
    .map_err(output_err)?;
    writeln!(out, "total: {}", tally.total).map_err(output_err)?;
    for status in SignStatus::ALL {
        let n = tally.by_status.get(status.label()).copied().unwrap_or(0);
        writeln!(out, "  {:<10} {n}", status.label()).map_err(output_err)?;
    }
    writeln!(
        out,
        "sources: {} authority only, {} commercial only, {} both",
        tally.authority_only, tally.commercial_only, tally.both
    )
    .map_err(output_err)?;
    if tally.flagged > 0 {
        writeln!(out, "flagged: {}", tally.flagged).map_err(output_err)?;
    }
    Ok(())
}
