//! Task templates that turn a title history into seq2seq text pairs.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::cluster::ClusterLabelMapper;

/// Rendered input/target text pair for a seq2seq model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub input_text: String,
    pub target_text: String,
}

/// Everything a task may need to render one sample.
#[derive(Debug, Clone, Copy)]
pub struct TaskContext<'a> {
    /// Ordered title history, oldest first.
    pub title_sequence: &'a [String],
    /// Ground-truth next title.
    pub next_title: &'a str,
    /// Auxiliary keywords, when the dataset provides them.
    pub keywords: Option<&'a [String]>,
    /// Label-to-cluster mapping, required by clustered variants.
    pub cluster_mapper: Option<&'a ClusterLabelMapper>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("clustered task rendered without a cluster mapper")]
    MissingClusterMapper,
    #[error("side-info task rendered for a sample without keywords")]
    MissingKeywords,
    #[error("label '{0}' is not in the cluster mapping")]
    UnknownClusterLabel(String),
}

/// The closed set of prompt formats. Serialized with a `type` tag so a
/// saved experiment config states exactly which tasks it trained on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Task {
    /// Predict the next title from the history.
    Direct,
    /// Direct prediction with the sample's keywords appended to the input.
    DirectSideInfo,
    /// Yes/no question about a candidate next title, drawn from the truth
    /// or a sampled negative.
    BoolCandidate { candidates: Vec<String> },
    /// Direct prediction with the next title's cluster id as an input hint.
    Clustered,
    /// Clustered prediction with keywords as well.
    ClusteredSideInfo,
}

impl Task {
    /// Render with the default negative-sampling strategy.
    pub fn render<R: Rng>(&self, ctx: &TaskContext, rng: &mut R) -> Result<Prompt, TaskError> {
        self.render_with_sampler(ctx, rng, &UniformNegativeSampler)
    }

    pub fn render_with_sampler<R: Rng>(
        &self,
        ctx: &TaskContext,
        rng: &mut R,
        sampler: &dyn NegativeSampler,
    ) -> Result<Prompt, TaskError> {
        let sequence = ctx.title_sequence.join(", ");
        match self {
            Task::Direct => Ok(Prompt {
                input_text: format!(
                    "Predict the next element of the following sequence of titles: {sequence}"
                ),
                target_text: ctx.next_title.to_string(),
            }),
            Task::DirectSideInfo => Ok(Prompt {
                input_text: format!(
                    "Predict the next element of the following sequence of titles: {sequence}\n\
                     The keywords relevant to the sequence are: {}",
                    keywords_of(ctx)?
                ),
                target_text: ctx.next_title.to_string(),
            }),
            Task::BoolCandidate { candidates } => {
                let negative = sampler.sample_negative(candidates, ctx.next_title, rng);
                // A positive is always available; use it when the coin says
                // so or when every candidate equals the truth.
                let (candidate, answer) = match negative {
                    Some(neg) if rng.gen_bool(0.5) => (neg, "no"),
                    _ => (ctx.next_title.to_string(), "yes"),
                };
                Ok(Prompt {
                    input_text: format!(
                        "Given the following sequence of titles: {sequence}\n\
                         Is \"{candidate}\" the next title? Reply with yes or no"
                    ),
                    target_text: answer.to_string(),
                })
            }
            Task::Clustered => Ok(Prompt {
                input_text: format!(
                    "Predict the next element of the following sequence of titles: {sequence}\n\
                     The next title belongs to cluster {}",
                    cluster_of(ctx)?
                ),
                target_text: ctx.next_title.to_string(),
            }),
            Task::ClusteredSideInfo => Ok(Prompt {
                input_text: format!(
                    "Predict the next element of the following sequence of titles: {sequence}\n\
                     The keywords relevant to the sequence are: {}\n\
                     The next title belongs to cluster {}",
                    keywords_of(ctx)?,
                    cluster_of(ctx)?
                ),
                target_text: ctx.next_title.to_string(),
            }),
        }
    }

    /// Whether rendering this task needs a cluster mapper.
    pub fn needs_cluster_mapper(&self) -> bool {
        matches!(self, Task::Clustered | Task::ClusteredSideInfo)
    }
}

fn keywords_of(ctx: &TaskContext) -> Result<String, TaskError> {
    ctx.keywords
        .filter(|kw| !kw.is_empty())
        .map(|kw| kw.join(", "))
        .ok_or(TaskError::MissingKeywords)
}

fn cluster_of(ctx: &TaskContext) -> Result<usize, TaskError> {
    let mapper = ctx.cluster_mapper.ok_or(TaskError::MissingClusterMapper)?;
    mapper
        .cluster_of(ctx.next_title)
        .ok_or_else(|| TaskError::UnknownClusterLabel(ctx.next_title.to_string()))
}

/// Strategy for picking a wrong candidate in the boolean task.
pub trait NegativeSampler {
    /// A candidate different from `truth`, or `None` if there is none.
    fn sample_negative(
        &self,
        candidates: &[String],
        truth: &str,
        rng: &mut dyn rand::RngCore,
    ) -> Option<String>;
}

/// Draws uniformly from the candidates excluding the ground truth.
pub struct UniformNegativeSampler;

impl NegativeSampler for UniformNegativeSampler {
    fn sample_negative(
        &self,
        candidates: &[String],
        truth: &str,
        rng: &mut dyn rand::RngCore,
    ) -> Option<String> {
        let negatives: Vec<&String> = candidates.iter().filter(|c| *c != truth).collect();
        negatives.choose(rng).map(|c| (*c).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn titles(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn ctx<'a>(history: &'a [String], next: &'a str) -> TaskContext<'a> {
        TaskContext {
            title_sequence: history,
            next_title: next,
            keywords: None,
            cluster_mapper: None,
        }
    }

    #[test]
    fn test_direct_prompt() {
        let history = titles(&["analyst", "engineer"]);
        let mut rng = StdRng::seed_from_u64(0);
        let prompt = Task::Direct.render(&ctx(&history, "manager"), &mut rng).unwrap();
        assert_eq!(
            prompt.input_text,
            "Predict the next element of the following sequence of titles: analyst, engineer"
        );
        assert_eq!(prompt.target_text, "manager");
    }

    #[test]
    fn test_side_info_requires_keywords() {
        let history = titles(&["analyst"]);
        let mut rng = StdRng::seed_from_u64(0);
        let err = Task::DirectSideInfo
            .render(&ctx(&history, "engineer"), &mut rng)
            .unwrap_err();
        assert_eq!(err, TaskError::MissingKeywords);

        let keywords = titles(&["data", "sql"]);
        let mut c = ctx(&history, "engineer");
        c.keywords = Some(&keywords);
        let prompt = Task::DirectSideInfo.render(&c, &mut rng).unwrap();
        assert!(prompt
            .input_text
            .ends_with("The keywords relevant to the sequence are: data, sql"));
        assert_eq!(prompt.target_text, "engineer");
    }

    #[test]
    fn test_bool_candidate_yes_and_no_both_occur() {
        let history = titles(&["analyst"]);
        let candidates = titles(&["engineer", "manager", "director"]);
        let task = Task::BoolCandidate { candidates };
        let mut rng = StdRng::seed_from_u64(42);
        let mut saw_yes = false;
        let mut saw_no = false;
        for _ in 0..50 {
            let prompt = task.render(&ctx(&history, "engineer"), &mut rng).unwrap();
            match prompt.target_text.as_str() {
                "yes" => {
                    saw_yes = true;
                    assert!(prompt.input_text.contains("Is \"engineer\" the next title?"));
                }
                "no" => {
                    saw_no = true;
                    assert!(!prompt.input_text.contains("Is \"engineer\" the next title?"));
                }
                other => panic!("unexpected target {other}"),
            }
        }
        assert!(saw_yes && saw_no);
    }

    #[test]
    fn test_bool_candidate_without_negatives_is_positive() {
        let history = titles(&["analyst"]);
        let task = Task::BoolCandidate { candidates: titles(&["engineer"]) };
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..10 {
            let prompt = task.render(&ctx(&history, "engineer"), &mut rng).unwrap();
            assert_eq!(prompt.target_text, "yes");
        }
    }

    #[test]
    fn test_clustered_requires_mapper() {
        let history = titles(&["analyst"]);
        let mut rng = StdRng::seed_from_u64(0);
        let err = Task::Clustered
            .render(&ctx(&history, "engineer"), &mut rng)
            .unwrap_err();
        assert_eq!(err, TaskError::MissingClusterMapper);
    }

    #[test]
    fn test_clustered_prompt_includes_cluster_id() {
        let history = titles(&["analyst"]);
        let mapper = ClusterLabelMapper::from_assignments(
            [("engineer".to_string(), 3usize)].into_iter().collect(),
            4,
        );
        let mut c = ctx(&history, "engineer");
        c.cluster_mapper = Some(&mapper);
        let mut rng = StdRng::seed_from_u64(0);
        let prompt = Task::Clustered.render(&c, &mut rng).unwrap();
        assert!(prompt.input_text.ends_with("The next title belongs to cluster 3"));
        assert_eq!(prompt.target_text, "engineer");

        c.next_title = "stranger";
        let err = Task::Clustered.render(&c, &mut rng).unwrap_err();
        assert_eq!(err, TaskError::UnknownClusterLabel("stranger".to_string()));
    }

    #[test]
    fn test_task_serde_round_trip() {
        let tasks = vec![
            Task::Direct,
            Task::DirectSideInfo,
            Task::BoolCandidate { candidates: titles(&["a", "b"]) },
            Task::Clustered,
            Task::ClusteredSideInfo,
        ];
        let json = serde_json::to_string(&tasks).unwrap();
        assert!(json.contains(r#""type":"direct""#));
        assert!(json.contains(r#""type":"bool_candidate""#));
        let back: Vec<Task> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tasks);
    }

    #[test]
    fn test_reconstructed_task_renders_identically() {
        let history = titles(&["analyst", "engineer"]);
        let keywords = titles(&["data"]);
        let mapper = ClusterLabelMapper::from_assignments(
            [("manager".to_string(), 1usize)].into_iter().collect(),
            2,
        );
        let mut c = ctx(&history, "manager");
        c.keywords = Some(&keywords);
        c.cluster_mapper = Some(&mapper);

        let tasks = vec![
            Task::Direct,
            Task::DirectSideInfo,
            Task::BoolCandidate { candidates: titles(&["manager", "director"]) },
            Task::Clustered,
            Task::ClusteredSideInfo,
        ];
        for task in tasks {
            let json = serde_json::to_string(&task).unwrap();
            let rebuilt: Task = serde_json::from_str(&json).unwrap();
            let mut rng_a = StdRng::seed_from_u64(11);
            let mut rng_b = StdRng::seed_from_u64(11);
            let original = task.render(&c, &mut rng_a).unwrap();
            let reconstructed = rebuilt.render(&c, &mut rng_b).unwrap();
            assert_eq!(original, reconstructed);
        }
    }

    #[test]
    fn test_unknown_task_tag_rejected() {
        assert!(serde_json::from_str::<Task>(r#"{"type": "mystery"}"#).is_err());
    }
}
