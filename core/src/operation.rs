//! The closed catalogue of benchmarked operations and the workload generator.
//!
//! Every operation expands to a preamble declaring the class template `x`, whose
//! specializations `x<0>` .. `x<N-1>` are the placeholder entities, followed by
//! exactly N alias declarations that invoke the operation over the full entity
//! list. Generation is a pure function of the operation and N.

use std::fmt;
use std::fmt::Write as _;
use std::str::FromStr;

use serde::Serialize;

use crate::error::BenchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    At,
    Drop,
    Erase,
    Filter,
    Insert,
    Reverse,
    Take,
    Unique,
}

const DECLARED_TEMPLATE: &str = "template<int> struct x;\n";
const VALUED_TEMPLATE: &str = "template<int N> struct x { static constexpr auto value = N; };\n";

/// How the arguments of one usage line are shaped.
#[derive(Clone, Copy)]
enum Arguments {
    /// `op<i, LIST>`
    Indexed,
    /// `op<i, void, LIST>`
    IndexedWithValue,
    /// `op<LIST>`
    List,
    /// `op<LIST, LIST>`
    DoubledList,
}

impl Operation {
    pub const ALL: [Operation; 8] = [
        Operation::At,
        Operation::Drop,
        Operation::Erase,
        Operation::Filter,
        Operation::Insert,
        Operation::Reverse,
        Operation::Take,
        Operation::Unique,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::At => "at",
            Operation::Drop => "drop",
            Operation::Erase => "erase",
            Operation::Filter => "filter",
            Operation::Insert => "insert",
            Operation::Reverse => "reverse",
            Operation::Take => "take",
            Operation::Unique => "unique",
        }
    }

    fn preamble(self) -> &'static str {
        match self {
            Operation::Filter => VALUED_TEMPLATE,
            _ => DECLARED_TEMPLATE,
        }
    }

    fn arguments(self) -> Arguments {
        match self {
            Operation::At | Operation::Drop | Operation::Erase | Operation::Take => Arguments::Indexed,
            Operation::Insert => Arguments::IndexedWithValue,
            Operation::Filter | Operation::Reverse => Arguments::List,
            Operation::Unique => Arguments::DoubledList,
        }
    }

    /// Produce the synthetic workload exercising this operation at size `n`.
    pub fn generate(self, n: usize) -> Workload {
        let list = entity_list(n);
        let name = self.as_str();
        let usages = (0..n)
            .map(|i| match self.arguments() {
                Arguments::Indexed => format!("using x_{i} = {name}<{i}, {list}>;\n"),
                Arguments::IndexedWithValue => format!("using x_{i} = {name}<{i}, void, {list}>;\n"),
                Arguments::List => format!("using x_{i} = {name}<{list}>;\n"),
                Arguments::DoubledList => format!("using x_{i} = {name}<{list}, {list}>;\n"),
            })
            .collect();
        Workload {
            preamble: self.preamble().to_string(),
            usages,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| BenchError::UnknownOperation { name: s.to_string() })
    }
}

/// `x<0>,x<1>,...,x<n-1>`
fn entity_list(n: usize) -> String {
    let mut list = String::with_capacity(n * 6);
    for i in 0..n {
        if i > 0 {
            list.push(',');
        }
        let _ = write!(list, "x<{}>", i);
    }
    list
}

/// Generated workload text, split into its fixed preamble and the usage lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workload {
    pub preamble: String,
    pub usages: Vec<String>,
}

impl Workload {
    pub fn usage_count(&self) -> usize {
        self.usages.len()
    }

    pub fn render(&self) -> String {
        let len = self.preamble.len() + self.usages.iter().map(String::len).sum::<usize>();
        let mut text = String::with_capacity(len);
        text.push_str(&self.preamble);
        for usage in &self.usages {
            text.push_str(usage);
        }
        text
    }
}

/// Full artifact text: the SUT snippet followed by the generated workload.
pub fn append_workload(snippet: &str, workload: &Workload) -> String {
    let rendered = workload.render();
    let mut text = String::with_capacity(snippet.len() + rendered.len() + 1);
    text.push_str(snippet);
    if !snippet.is_empty() && !snippet.ends_with('\n') {
        text.push('\n');
    }
    text.push_str(&rendered);
    text
}
