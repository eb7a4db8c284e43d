//! Sealed pattern matcher backing bound-claim rules and policy path grants.

// self
use crate::_prelude::*;

/// Match mode applied to a binding's bound claims.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
	/// Byte-equal comparison.
	#[default]
	Exact,
	/// `*` wildcard-segment matching.
	Glob,
}

/// Compiled claim or path pattern.
///
/// The two variants are the entire matching language; there is no fallback to
/// ad hoc string scanning elsewhere in the crate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Pattern {
	/// Matches by byte equality.
	Exact(String),
	/// Matches with `*` wildcard segments; literal parts must appear in order.
	Glob {
		/// Original pattern text, kept for display and serialization.
		raw: String,
		/// Literal parts split around `*` wildcards.
		parts: Vec<String>,
	},
}
impl Pattern {
	/// Compiles a pattern under the provided match mode.
	pub fn compile(raw: impl Into<String>, mode: MatchMode) -> Self {
		let raw = raw.into();

		match mode {
			MatchMode::Exact => Self::Exact(raw),
			MatchMode::Glob => {
				let parts = raw.split('*').map(str::to_owned).collect();

				Self::Glob { raw, parts }
			},
		}
	}

	/// Compiles a glob pattern; exact text without `*` still matches byte-equal.
	pub fn glob(raw: impl Into<String>) -> Self {
		Self::compile(raw, MatchMode::Glob)
	}

	/// Compiles an exact pattern.
	pub fn exact(raw: impl Into<String>) -> Self {
		Self::compile(raw, MatchMode::Exact)
	}

	/// Returns the original pattern text.
	pub fn raw(&self) -> &str {
		match self {
			Self::Exact(raw) => raw,
			Self::Glob { raw, .. } => raw,
		}
	}

	/// Evaluates the pattern against an input string.
	pub fn matches(&self, input: &str) -> bool {
		match self {
			Self::Exact(raw) => raw == input,
			Self::Glob { parts, .. } => glob_match(parts, input),
		}
	}
}
impl Display for Pattern {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.raw())
	}
}

fn glob_match(parts: &[String], input: &str) -> bool {
	let Some((first, rest_parts)) = parts.split_first() else {
		return input.is_empty();
	};
	// A lone part means the pattern contained no `*` at all.
	let Some((last, middle)) = rest_parts.split_last() else {
		return first == input;
	};
	let Some(mut rest) = input.strip_prefix(first.as_str()) else {
		return false;
	};

	for part in middle {
		if part.is_empty() {
			continue;
		}

		match rest.find(part.as_str()) {
			Some(idx) => rest = &rest[idx + part.len()..],
			None => return false,
		}
	}

	rest.len() >= last.len() && rest.ends_with(last.as_str())
}
