//! Summary writers for training and evaluation streams.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use crate::algorithms::ddpg::OptimizationSummary;
use crate::evaluation::EvalSummary;
use crate::hindsight::HindsightStats;

/// Episode outcome tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EpisodeCounters {
    pub episodes: usize,
    pub successes: usize,
    pub collisions: usize,
    pub max_length: usize,
}

impl EpisodeCounters {
    pub fn success_rate(&self) -> f32 {
        ratio(self.successes, self.episodes)
    }

    pub fn collision_rate(&self) -> f32 {
        ratio(self.collisions, self.episodes)
    }

    pub fn max_length_rate(&self) -> f32 {
        ratio(self.max_length, self.episodes)
    }
}

fn ratio(n: usize, d: usize) -> f32 {
    if d == 0 {
        0.0
    } else {
        n as f32 / d as f32
    }
}

/// One summary record, keyed by global step.
#[derive(Debug, Clone, PartialEq)]
pub enum SummaryEvent {
    TrainEpisodes {
        step: usize,
        counters: EpisodeCounters,
        hindsight: HindsightStats,
    },
    Optimization {
        step: usize,
        summary: OptimizationSummary,
    },
    TestEpisodes {
        step: usize,
        summary: EvalSummary,
    },
    Curriculum {
        step: usize,
        allowed_size: f32,
    },
}

impl SummaryEvent {
    pub fn step(&self) -> usize {
        match self {
            SummaryEvent::TrainEpisodes { step, .. }
            | SummaryEvent::Optimization { step, .. }
            | SummaryEvent::TestEpisodes { step, .. }
            | SummaryEvent::Curriculum { step, .. } => *step,
        }
    }

    /// Stream name (`train`, `optimization`, `test`, `curriculum`).
    pub fn stream(&self) -> &'static str {
        match self {
            SummaryEvent::TrainEpisodes { .. } => "train",
            SummaryEvent::Optimization { .. } => "optimization",
            SummaryEvent::TestEpisodes { .. } => "test",
            SummaryEvent::Curriculum { .. } => "curriculum",
        }
    }

    /// Named scalar values of the event.
    pub fn scalars(&self) -> Vec<(&'static str, f64)> {
        match self {
            SummaryEvent::TrainEpisodes {
                counters,
                hindsight,
                ..
            } => vec![
                ("episodes", counters.episodes as f64),
                ("success_rate", counters.success_rate() as f64),
                ("collision_rate", counters.collision_rate() as f64),
                ("max_length_rate", counters.max_length_rate() as f64),
                (
                    "relabeled_success_rate",
                    hindsight.relabeled_success_rate() as f64,
                ),
            ],
            SummaryEvent::Optimization { summary, .. } => {
                let mut values = vec![
                    ("critic_loss", summary.critic_loss as f64),
                    ("mean_q", summary.mean_q as f64),
                    ("label_min", summary.label_min as f64),
                    ("label_max", summary.label_max as f64),
                    ("actor_loss", summary.actor_loss as f64),
                    ("out_of_range_labels", summary.out_of_range_labels as f64),
                ];
                if let Some(reward_loss) = summary.reward_loss {
                    values.push(("reward_loss", reward_loss as f64));
                }
                values
            }
            SummaryEvent::TestEpisodes { summary, .. } => vec![
                ("episodes", summary.episodes as f64),
                ("success_rate", summary.counters().success_rate() as f64),
                ("collision_rate", summary.counters().collision_rate() as f64),
                ("max_length_rate", summary.counters().max_length_rate() as f64),
                ("mean_reward", summary.mean_reward as f64),
            ],
            SummaryEvent::Curriculum { allowed_size, .. } => {
                vec![("allowed_size", *allowed_size as f64)]
            }
        }
    }
}

/// Logger trait for summary backends.
pub trait MetricsLogger: Send {
    fn log(&mut self, event: &SummaryEvent);

    /// Flush any buffered output.
    fn flush(&mut self);
}

fn log_counters(elapsed: f32, stream: &str, step: usize, counters: &EpisodeCounters) {
    log::info!(
        "[{:>8.1}s] {} @ {}: finished: {}, successful: {} ({:.3}), \
         collision: {} ({:.3}), max length: {} ({:.3})",
        elapsed,
        stream,
        step,
        counters.episodes,
        counters.successes,
        counters.success_rate(),
        counters.collisions,
        counters.collision_rate(),
        counters.max_length,
        counters.max_length_rate()
    );
}

/// Writes summaries through the `log` facade at info level.
pub struct ConsoleLogger {
    start_time: Instant,
}

impl ConsoleLogger {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }
}

impl Default for ConsoleLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsLogger for ConsoleLogger {
    fn log(&mut self, event: &SummaryEvent) {
        let elapsed = self.start_time.elapsed().as_secs_f32();
        match event {
            SummaryEvent::TrainEpisodes {
                step,
                counters,
                hindsight,
            } => {
                log_counters(elapsed, "train", *step, counters);
                log::info!(
                    "relabeled transitions {} ({:.3} reach their goal)",
                    hindsight.relabeled,
                    hindsight.relabeled_success_rate()
                );
            }
            SummaryEvent::TestEpisodes { step, summary } => {
                log_counters(elapsed, "test", *step, &summary.counters());
                log::info!("test mean total reward {:.4}", summary.mean_reward);
            }
            SummaryEvent::Optimization { step, summary } => {
                log::info!(
                    "[{:>8.1}s] optimization @ {}: critic {:.5}, actor {:.5}, \
                     mean Q {:.4}, labels [{:.3}, {:.3}]",
                    elapsed,
                    step,
                    summary.critic_loss,
                    summary.actor_loss,
                    summary.mean_q,
                    summary.label_min,
                    summary.label_max
                );
            }
            SummaryEvent::Curriculum { step, allowed_size } => {
                log::info!(
                    "[{:>8.1}s] curriculum @ {}: allowed size {:.3}",
                    elapsed,
                    step,
                    allowed_size
                );
            }
        }
    }

    fn flush(&mut self) {}
}

/// Long-format CSV: one `step,stream,metric,value` row per scalar.
pub struct CSVLogger {
    writer: BufWriter<File>,
}

impl CSVLogger {
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "step,stream,metric,value")?;
        Ok(Self { writer })
    }
}

impl MetricsLogger for CSVLogger {
    fn log(&mut self, event: &SummaryEvent) {
        for (metric, value) in event.scalars() {
            let row = writeln!(
                self.writer,
                "{},{},{},{}",
                event.step(),
                event.stream(),
                metric,
                value
            );
            if let Err(e) = row {
                log::error!("failed to write summary row: {}", e);
                return;
            }
        }
    }

    fn flush(&mut self) {
        if let Err(e) = self.writer.flush() {
            log::error!("failed to flush summaries: {}", e);
        }
    }
}

impl Drop for CSVLogger {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Fans events out to several loggers.
pub struct MultiLogger {
    loggers: Vec<Box<dyn MetricsLogger>>,
}

impl MultiLogger {
    pub fn new() -> Self {
        Self {
            loggers: Vec::new(),
        }
    }

    pub fn add<L: MetricsLogger + 'static>(mut self, logger: L) -> Self {
        self.loggers.push(Box::new(logger));
        self
    }

    pub fn len(&self) -> usize {
        self.loggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loggers.is_empty()
    }
}

impl Default for MultiLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsLogger for MultiLogger {
    fn log(&mut self, event: &SummaryEvent) {
        for logger in &mut self.loggers {
            logger.log(event);
        }
    }

    fn flush(&mut self) {
        for logger in &mut self.loggers {
            logger.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn counters() -> EpisodeCounters {
        EpisodeCounters {
            episodes: 10,
            successes: 4,
            collisions: 5,
            max_length: 1,
        }
    }

    #[test]
    fn test_counter_rates() {
        let c = counters();
        assert!((c.success_rate() - 0.4).abs() < 1e-6);
        assert!((c.collision_rate() - 0.5).abs() < 1e-6);
        assert_eq!(EpisodeCounters::default().success_rate(), 0.0);
    }

    #[test]
    fn test_optimization_scalars_include_reward_loss_only_when_trained() {
        let mut summary = OptimizationSummary::default();
        let event = SummaryEvent::Optimization { step: 3, summary };
        assert!(event.scalars().iter().all(|(k, _)| *k != "reward_loss"));

        summary.reward_loss = Some(0.1);
        let event = SummaryEvent::Optimization { step: 3, summary };
        assert!(event.scalars().iter().any(|(k, _)| *k == "reward_loss"));
    }

    #[test]
    fn test_csv_logger_writes_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("summaries.csv");
        {
            let mut logger = CSVLogger::new(&path).unwrap();
            logger.log(&SummaryEvent::TrainEpisodes {
                step: 7,
                counters: counters(),
                hindsight: HindsightStats {
                    real: 10,
                    relabeled: 40,
                    relabeled_successes: 10,
                },
            });
            logger.log(&SummaryEvent::Curriculum {
                step: 7,
                allowed_size: 0.5,
            });
        }

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "step,stream,metric,value");
        assert_eq!(lines[1], "7,train,episodes,10");
        assert!(lines.contains(&"7,train,relabeled_success_rate,0.25"));
        assert!(lines.contains(&"7,curriculum,allowed_size,0.5"));
        assert_eq!(lines.len(), 1 + 5 + 1);
    }

    #[test]
    fn test_multi_logger_fans_out() {
        let dir = tempdir().unwrap();
        let mut multi = MultiLogger::new()
            .add(ConsoleLogger::new())
            .add(CSVLogger::new(dir.path().join("a.csv")).unwrap());
        assert_eq!(multi.len(), 2);
        multi.log(&SummaryEvent::Curriculum {
            step: 0,
            allowed_size: 0.1,
        });
        multi.flush();
    }
}
