//! Unified logging system

use colored::*;
use std::sync::atomic::{AtomicBool, Ordering};

static VERBOSE: AtomicBool = AtomicBool::new(false);
static TO_STDERR: AtomicBool = AtomicBool::new(false);

const LOGO: &str = r#"
       _       __                     __ 
      (_)___  / /_  ______________  __/ /_
     / / __ \/ __ \/ ___/ ___/ __ \/ / / __/
    / / /_/ / /_/ (__  ) /__/ /_/ / /_/ /_  
 __/ /\____/_.___/____/\___/\____/\__,_/\__/  
/___/                                         "#;

const SLOGANS: &[&str] = &[
	"Your next internship is in here somewhere",
	"Scraping so you don't have to",
	"Now hiring: one more embedding",
	"Cosine similarity, warm introductions",
	"Ctrl+F for careers",
	"Every posting gets a second look",
];

pub fn random_slogan() -> &'static str {
	let idx = rand::random_range(0..SLOGANS.len());
	SLOGANS[idx]
}

pub fn print_logo() {
	emit(LOGO.bright_blue().bold());
	emit(random_slogan().dimmed().italic());
}

pub struct Log;

impl Log {
	pub fn set_verbose(enabled: bool) {
		VERBOSE.store(enabled, Ordering::Relaxed);
	}

	pub fn is_verbose() -> bool {
		VERBOSE.load(Ordering::Relaxed)
	}

	/// Send every console line to stderr, leaving stdout to JSON output
	pub fn set_stderr(enabled: bool) {
		TO_STDERR.store(enabled, Ordering::Relaxed);
	}

	pub fn is_stderr() -> bool {
		TO_STDERR.load(Ordering::Relaxed)
	}
}

fn emit(line: impl std::fmt::Display) {
	if Log::is_stderr() {
		eprintln!("{}", line);
	} else {
		println!("{}", line);
	}
}

pub fn info(msg: &str) {
	emit(format!("{} {}", "ℹ".bright_blue().bold(), msg.bright_white()));
}

pub fn success(msg: &str) {
	emit(format!("{} {}", "✓".bright_green().bold(), msg.bright_white()));
}

pub fn warn(msg: &str) {
	emit(format!("{} {}", "⚠".bright_yellow().bold(), msg.bright_white()));
}

pub fn error(msg: &str) {
	emit(format!("{} {}", "✗".bright_red().bold(), msg.bright_white()));
}

pub fn debug(msg: &str) {
	if Log::is_verbose() {
		emit(format!("{} {}", "⚙".bright_black().bold(), msg.dimmed()));
	}
}

pub fn header(text: &str) {
	emit(format!("\n{}", text.bright_blue().bold()));
}

/// Aligned `label: value` line for reports and statistics
pub fn field(label: &str, value: impl std::fmt::Display) {
	emit(format!("  {:<24} {}", format!("{}:", label).dimmed(), value));
}

/// Clickable URL (OSC 8 terminal hyperlink), shortened to `max_len` characters
pub fn link(url: &str, max_len: usize) -> String {
	let chars: Vec<char> = url.chars().collect();
	let display = if chars.len() > max_len && max_len > 3 {
		let half = (max_len - 3) / 2;
		let head: String = chars[..half].iter().collect();
		let tail: String = chars[chars.len() - half..].iter().collect();
		format!("{}...{}", head, tail)
	} else {
		url.to_string()
	};

	format!("\x1b]8;;{}\x1b\\{}\x1b]8;;\x1b\\", url, display)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn long_links_are_shortened() {
		let url = "https://careers.example.com/jobs/12345/software-engineering-intern";
		let rendered = link(url, 20);
		assert!(rendered.contains("..."));
		assert!(rendered.starts_with("\x1b]8;;https://careers.example.com"));
		assert!(link("https://a.io", 20).ends_with("https://a.io\x1b]8;;\x1b\\"));
	}
}
