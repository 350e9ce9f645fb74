use clap::ValueEnum;
use rand::seq::SliceRandom;
use rand::thread_rng;

/// A single completion request to be issued by the benchmarker.
#[derive(Debug, Clone)]
pub struct BenchmarkRequest {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

/// Built-in prompt suites of varying length. Short prompts stress decode
/// throughput, the long prompt stresses prefill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PromptSet {
    Short,
    Medium,
    Long,
    Mixed,
}

impl std::fmt::Display for PromptSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PromptSet::Short => "short",
            PromptSet::Medium => "medium",
            PromptSet::Long => "long",
            PromptSet::Mixed => "mixed",
        };
        write!(f, "{}", name)
    }
}

const SHORT_PROMPT: &str = "Say hello.";

const MEDIUM_PROMPT: &str = "Explain the concept of machine learning in 100 words.";

const LONG_PROMPT: &str = "Write a detailed technical explanation of how mixture of \
     experts models work, including their architecture, training process, and \
     advantages over dense models. Include specific examples.";

/// Source of benchmark requests. Requests are generated by index so that
/// concurrent workers can pull work without coordination; the pool rotates
/// through its prompts when the sample count exceeds the pool size.
#[derive(Debug, Clone)]
pub struct PromptPool {
    prompts: Vec<String>,
    max_tokens: u32,
    temperature: f64,
}

impl PromptPool {
    /// A pool that repeats a single fixed prompt.
    pub fn fixed(prompt: impl Into<String>, max_tokens: u32, temperature: f64) -> Self {
        Self {
            prompts: vec![prompt.into()],
            max_tokens,
            temperature,
        }
    }

    /// A pool over one of the built-in suites, optionally shuffled.
    pub fn builtin(set: PromptSet, shuffle: bool, max_tokens: u32, temperature: f64) -> Self {
        let mut prompts: Vec<String> = match set {
            PromptSet::Short => vec![SHORT_PROMPT.to_string()],
            PromptSet::Medium => vec![MEDIUM_PROMPT.to_string()],
            PromptSet::Long => vec![LONG_PROMPT.to_string()],
            PromptSet::Mixed => vec![
                SHORT_PROMPT.to_string(),
                MEDIUM_PROMPT.to_string(),
                LONG_PROMPT.to_string(),
            ],
        };

        if shuffle {
            prompts.shuffle(&mut thread_rng());
        }

        Self {
            prompts,
            max_tokens,
            temperature,
        }
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }

    /// Human-readable description of the pool for report headers.
    pub fn describe(&self) -> String {
        if self.prompts.len() == 1 {
            "fixed prompt".to_string()
        } else {
            format!("rotating pool of {}", self.prompts.len())
        }
    }

    /// The request for a given sample index.
    pub fn request(&self, index: usize) -> BenchmarkRequest {
        BenchmarkRequest {
            prompt: self.prompts[index % self.prompts.len()].clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}
