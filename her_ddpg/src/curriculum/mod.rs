//! Curriculum over allowed path length.
//!
//! A small state machine over discrete difficulty levels. Test statistics are
//! accumulated into a window; once the window holds enough episodes the
//! success rate decides whether to promote, demote or stay, and the window
//! starts over.

use crate::config::CurriculumConfig;

/// Difficulty controller driven by evaluation success rate.
#[derive(Debug, Clone)]
pub struct CurriculumManager {
    levels: Vec<f32>,
    level: usize,
    enabled: bool,
    promotion_threshold: f32,
    demotion_threshold: Option<f32>,
    min_window_episodes: usize,
    window_episodes: usize,
    window_successes: usize,
}

impl CurriculumManager {
    pub fn new(config: &CurriculumConfig) -> Self {
        let levels = match &config.levels {
            Some(levels) => levels.clone(),
            None => Self::generate_levels(config.start_size, config.increase, config.max_size),
        };
        // Disabled curriculum trains at full difficulty throughout
        let level = if config.enabled {
            0
        } else {
            levels.len().saturating_sub(1)
        };
        Self {
            levels,
            level,
            enabled: config.enabled,
            promotion_threshold: config.promotion_threshold,
            demotion_threshold: config.demotion_threshold,
            min_window_episodes: config.min_window_episodes.max(1),
            window_episodes: 0,
            window_successes: 0,
        }
    }

    /// `start, start + increase, ...` capped at `max`, which is always the last level.
    fn generate_levels(start: f32, increase: f32, max: f32) -> Vec<f32> {
        let mut levels = Vec::new();
        let mut level = 0usize;
        loop {
            let size = start + level as f32 * increase;
            if size >= max - 1e-6 || increase <= 0.0 {
                levels.push(max);
                break;
            }
            levels.push(size);
            level += 1;
        }
        levels
    }

    /// Feed the latest test counts and get `(allowed_size, has_changed)`.
    pub fn get_next_parameters(
        &mut self,
        test_episode_count: usize,
        test_success_count: usize,
    ) -> (f32, bool) {
        if !self.enabled {
            return (self.allowed_size(), false);
        }

        self.window_episodes += test_episode_count;
        self.window_successes += test_success_count.min(test_episode_count);
        if self.window_episodes < self.min_window_episodes {
            return (self.allowed_size(), false);
        }

        let rate = self.window_successes as f32 / self.window_episodes as f32;
        let previous = self.level;
        if rate >= self.promotion_threshold {
            if self.level + 1 < self.levels.len() {
                self.level += 1;
            }
        } else if let Some(demotion) = self.demotion_threshold {
            if rate <= demotion && self.level > 0 {
                self.level -= 1;
            }
        }
        self.window_episodes = 0;
        self.window_successes = 0;

        let changed = self.level != previous;
        if changed {
            log::info!(
                "curriculum level {} -> {} (allowed size {:.3}, success rate {:.3})",
                previous,
                self.level,
                self.allowed_size(),
                rate
            );
        }
        (self.allowed_size(), changed)
    }

    /// Current allowed path length.
    pub fn allowed_size(&self) -> f32 {
        self.levels[self.level]
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn levels(&self) -> &[f32] {
        &self.levels
    }

    pub fn is_at_max(&self) -> bool {
        self.level + 1 == self.levels.len()
    }

    /// Episodes accumulated in the current window.
    pub fn window_episodes(&self) -> usize {
        self.window_episodes
    }
}
