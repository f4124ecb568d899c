use clap::builder::styling::{AnsiColor, Style, Styles};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;

use crate::pipeline::collect::TargetKind;
use crate::search::SearchMode;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
	#[default]
	Text,
	Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CollectType {
	/// One query per company and keyword
	Companies,
	/// One query per engineering field and keyword
	Fields,
}

impl From<CollectType> for TargetKind {
	fn from(kind: CollectType) -> Self {
		match kind {
			CollectType::Companies => TargetKind::Companies,
			CollectType::Fields => TargetKind::Fields,
		}
	}
}

fn parse_threshold(s: &str) -> Result<f32, String> {
	let val: f32 = s.parse().map_err(|_| format!("'{}' is not a valid number", s))?;
	if !(0.0..=1.0).contains(&val) {
		Err(format!("threshold must be between 0.0 and 1.0, got {}", val))
	} else {
		Ok(val)
	}
}

fn styles() -> Styles {
	Styles::styled()
		.header(Style::new().bold().fg_color(Some(AnsiColor::Blue.into())))
		.usage(Style::new().bold().fg_color(Some(AnsiColor::Blue.into())))
		.literal(Style::new().fg_color(Some(AnsiColor::Blue.into())))
		.placeholder(Style::new().fg_color(Some(AnsiColor::Yellow.into())))
		.valid(Style::new().fg_color(Some(AnsiColor::Blue.into())))
		.invalid(Style::new().fg_color(Some(AnsiColor::Red.into())))
}

#[derive(Parser, Debug)]
#[command(
	name = "jobscout",
	author,
	version,
	about = "Collect, enrich, cluster and search engineering job listings",
	styles = styles(),
	after_help = format!(
		"{title}
  {bin} {setup}                          {setup_desc}
  {bin} {collect} {collect_args}   {collect_desc}
  {bin} {search} {search_args}  {search_desc}
  {bin} {update} {update_args}                 {update_desc}",
		title = "Examples:".bright_blue().bold(),
		bin = "jobscout".bright_blue(),
		setup = "setup".yellow(),
		setup_desc = "Create the store layout".dimmed(),
		collect = "collect".yellow(),
		collect_args = "--type companies -n 5",
		collect_desc = "Search company career pages".dimmed(),
		search = "search".yellow(),
		search_args = "--skills rust,embedded",
		search_desc = "Find listings by skills".dimmed(),
		update = "update".yellow(),
		update_args = "--daily",
		update_desc = "Run the full daily update".dimmed(),
	),
)]
pub struct Cli {
	/// Enable verbose debug output
	#[arg(short = 'v', long = "verbose", global = true)]
	pub verbose: bool,

	#[command(subcommand)]
	pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
	/// Create the document store layout (idempotent)
	Setup,

	/// Search the web for job listings and store new pages
	Collect {
		/// Restrict to company or field targets
		#[arg(short = 't', long = "type", value_name = "TYPE")]
		kind: Option<CollectType>,

		/// Only this company or field
		#[arg(short = 's', long = "specific", value_name = "NAME")]
		specific: Option<String>,

		/// Search results per query
		#[arg(short = 'n', long = "max-results")]
		max_results: Option<usize>,
	},

	/// Extract metadata and embeddings for unprocessed listings
	Process {
		/// Listings per batch
		#[arg(short = 'b', long = "batch-size")]
		batch_size: Option<usize>,

		/// Stop after this many listings
		#[arg(short = 'm', long = "max-listings")]
		max_listings: Option<usize>,

		/// Process a single listing
		#[arg(long = "listing-id", value_name = "ID")]
		listing_id: Option<String>,
	},

	/// Group listings into clusters and manage their summaries
	Cluster {
		/// Re-cluster all active listings
		#[arg(long = "create")]
		create: bool,

		/// List clusters
		#[arg(short = 'l', long = "list")]
		list: bool,

		/// Regenerate every cluster summary
		#[arg(long = "update-summaries")]
		update_summaries: bool,

		/// Show the summary of one cluster
		#[arg(long = "get-summary", value_name = "ID")]
		get_summary: Option<String>,

		#[arg(short = 'o', long = "output", default_value = "text")]
		output: OutputFormat,
	},

	/// Semantic search over active listings
	Search {
		#[command(flatten)]
		target: SearchTarget,

		/// Number of results
		#[arg(short = 'n', long = "limit", default_value_t = crate::config::DEFAULT_LIMIT)]
		limit: usize,

		/// Minimum similarity score (0.0-1.0)
		#[arg(long = "threshold", value_parser = parse_threshold)]
		threshold: Option<f32>,

		#[arg(short = 'o', long = "output", default_value = "text")]
		output: OutputFormat,
	},

	/// Maintain the listing database
	Update {
		/// Full run: collect, process, cluster, deduplicate, expire, retain
		#[arg(long = "daily")]
		daily: bool,

		/// Expire listings not seen recently
		#[arg(long = "mark-expired")]
		mark_expired: bool,

		/// Mark duplicate listings
		#[arg(long = "remove-duplicates")]
		remove_duplicates: bool,

		/// Delete the oldest listings beyond the configured maximum
		#[arg(long = "maintain-count")]
		maintain_count: bool,

		/// Print store statistics
		#[arg(long = "stats")]
		stats: bool,

		#[arg(short = 'o', long = "output", default_value = "text")]
		output: OutputFormat,
	},
}

impl Command {
	/// Requested output format; commands without `--output` print text
	pub fn output(&self) -> OutputFormat {
		match self {
			Self::Cluster { output, .. } | Self::Search { output, .. } | Self::Update { output, .. } => *output,
			Self::Setup | Self::Collect { .. } | Self::Process { .. } => OutputFormat::Text,
		}
	}
}

/// Exactly one search mode
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct SearchTarget {
	/// Free text query
	#[arg(short = 'q', long = "query")]
	pub query: Option<String>,

	/// Comma-separated skills
	#[arg(long = "skills", value_delimiter = ',')]
	pub skills: Option<Vec<String>>,

	/// Engineering field
	#[arg(long = "field")]
	pub field: Option<String>,

	/// Company and role
	#[arg(long = "company-role", num_args = 2, value_names = ["COMPANY", "ROLE"])]
	pub company_role: Option<Vec<String>>,

	/// Members of a cluster
	#[arg(long = "cluster", value_name = "ID")]
	pub cluster: Option<String>,

	/// Listings similar to a stored listing
	#[arg(long = "similar-to", value_name = "ID")]
	pub similar_to: Option<String>,
}

impl SearchTarget {
	pub fn into_mode(self) -> Option<SearchMode> {
		if let Some(query) = self.query {
			return Some(SearchMode::Text(query));
		}
		if let Some(skills) = self.skills {
			let skills = skills
				.into_iter()
				.map(|s| s.trim().to_string())
				.filter(|s| !s.is_empty())
				.collect();
			return Some(SearchMode::Skills(skills));
		}
		if let Some(field) = self.field {
			return Some(SearchMode::Field(field));
		}
		if let Some(mut pair) = self.company_role {
			let role = pair.pop()?;
			let company = pair.pop()?;
			return Some(SearchMode::CompanyRole { company, role });
		}
		if let Some(id) = self.cluster {
			return Some(SearchMode::Cluster(id));
		}
		self.similar_to.map(SearchMode::SimilarTo)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use clap::CommandFactory;

	#[test]
	fn cli_definition_is_valid() {
		Cli::command().debug_assert();
	}

	#[test]
	fn parses_company_role() {
		let cli = Cli::parse_from(["jobscout", "search", "--company-role", "SpaceX", "Intern"]);
		let Command::Search { target, limit, .. } = cli.command else {
			panic!("expected search");
		};
		assert_eq!(limit, crate::config::DEFAULT_LIMIT);
		assert_eq!(
			target.into_mode(),
			Some(SearchMode::CompanyRole {
				company: "SpaceX".into(),
				role: "Intern".into()
			})
		);
	}

	#[test]
	fn search_modes_are_exclusive() {
		assert!(Cli::try_parse_from(["jobscout", "search", "--field", "Aerospace", "--cluster", "c1"]).is_err());
		assert!(Cli::try_parse_from(["jobscout", "search"]).is_err());
	}

	#[test]
	fn output_format_per_command() {
		let cli = Cli::parse_from(["jobscout", "update", "--mark-expired", "-o", "json"]);
		assert_eq!(cli.command.output(), OutputFormat::Json);
		let cli = Cli::parse_from(["jobscout", "process"]);
		assert_eq!(cli.command.output(), OutputFormat::Text);
	}

	#[test]
	fn threshold_is_bounded() {
		assert!(Cli::try_parse_from(["jobscout", "search", "-q", "rust", "--threshold", "1.5"]).is_err());
	}

	#[test]
	fn skills_split_on_commas() {
		let cli = Cli::parse_from(["jobscout", "-v", "search", "--skills", "rust, c++"]);
		assert!(cli.verbose);
		let Command::Search { target, .. } = cli.command else {
			panic!("expected search");
		};
		assert_eq!(target.into_mode(), Some(SearchMode::Skills(vec!["rust".into(), "c++".into()])));
	}
}
