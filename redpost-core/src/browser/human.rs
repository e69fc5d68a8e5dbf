use std::time::Duration;

use rand::rngs::ThreadRng;
use rand::{thread_rng, Rng};
use tokio::time::sleep;

use chromiumoxide::element::Element;
use chromiumoxide::layout::Point;
use chromiumoxide::page::Page;

use crate::config::HumanSection;

use super::automation::ViewportSpec;
use super::error::{BrowserError, BrowserResult};
use super::selector::InteractionTarget;

/// Randomized delays and per-character typing cadence. Fixed-interval input
/// is the strongest automation signal, so every wait and keystroke is sampled.
#[derive(Debug)]
pub struct TimingModel {
    config: HumanSection,
    rng: ThreadRng,
}

/// A planned keystroke sequence. Planning is separated from execution so the
/// committed-text invariant can be checked without a browser.
#[derive(Debug, Clone)]
pub struct TypingPlan {
    pub events: Vec<TypingEvent>,
}

#[derive(Debug, Clone)]
pub enum TypingEvent {
    /// Type `ch`, then wait `delay`.
    Key { ch: char, delay: Duration },
    /// Cosmetic correction: delete the character just typed, pause, retype it.
    Correction { ch: char, pause: Duration },
}

impl TypingPlan {
    /// The text the field holds after the plan executes. Corrections are
    /// net no-ops by construction.
    pub fn committed_text(&self) -> String {
        let mut committed = String::new();
        for event in &self.events {
            match event {
                TypingEvent::Key { ch, .. } => committed.push(*ch),
                TypingEvent::Correction { ch, .. } => {
                    committed.pop();
                    committed.push(*ch);
                }
            }
        }
        committed
    }
}

impl TimingModel {
    pub fn new(config: HumanSection) -> Self {
        Self {
            config,
            rng: thread_rng(),
        }
    }

    /// Uniform sample in `[bounds[0], bounds[1]]` milliseconds.
    pub fn sample(&mut self, bounds: [u64; 2]) -> Duration {
        let lower = bounds[0].min(bounds[1]);
        let upper = bounds[0].max(bounds[1]);
        Duration::from_millis(self.rng.gen_range(lower..=upper))
    }

    pub async fn delay(&mut self, bounds: [u64; 2]) {
        let duration = self.sample(bounds);
        sleep(duration).await;
    }

    pub fn gamble(&mut self, probability: f64) -> bool {
        self.rng.gen_bool(probability.clamp(0.0, 1.0))
    }

    /// Plans the full keystroke sequence for `text`: CJK ideographs get a
    /// shorter base latency than other characters, each perturbed by additive
    /// jitter; occasionally a long "thinking" pause replaces the normal delay;
    /// rarely, on longer strings, a delete-and-retype correction is inserted.
    pub fn typing_plan(&mut self, text: &str) -> TypingPlan {
        let total_chars = text.chars().count();
        let mut events = Vec::with_capacity(total_chars);
        for (index, ch) in text.chars().enumerate() {
            let delay = if self.gamble(self.config.thinking_probability) {
                self.sample(self.config.thinking_pause_ms)
            } else {
                self.cadence(ch)
            };
            events.push(TypingEvent::Key { ch, delay });

            if total_chars > 10 && index > 2 && self.gamble(self.config.correction_probability) {
                let pause = self.sample(self.config.correction_pause_ms);
                events.push(TypingEvent::Correction { ch, pause });
            }
        }
        TypingPlan { events }
    }

    /// Focuses the element, clears it, then executes a fresh typing plan.
    pub async fn type_text(&mut self, element: &Element, text: &str) -> BrowserResult<()> {
        element.click().await.map_err(|err| {
            BrowserError::Unexpected(format!("failed to focus element before typing: {err}"))
        })?;
        self.delay(self.config.focus_pause_ms).await;

        element
            .call_js_fn(
                "function() { if ('value' in this) { this.value = ''; } else { this.textContent = ''; } }",
                false,
            )
            .await
            .map_err(|err| {
                BrowserError::Unexpected(format!("failed to clear element before typing: {err}"))
            })?;
        self.delay(self.config.clear_pause_ms).await;

        let plan = self.typing_plan(text);
        for event in &plan.events {
            match event {
                TypingEvent::Key { ch, delay } => {
                    element.type_str(ch.to_string()).await.map_err(|err| {
                        BrowserError::Unexpected(format!("failed to type character: {err}"))
                    })?;
                    sleep(*delay).await;
                }
                TypingEvent::Correction { ch, pause } => {
                    element.press_key("Backspace").await.map_err(|err| {
                        BrowserError::Unexpected(format!("failed to press backspace: {err}"))
                    })?;
                    sleep(*pause).await;
                    element.type_str(ch.to_string()).await.map_err(|err| {
                        BrowserError::Unexpected(format!("failed to retype character: {err}"))
                    })?;
                }
            }
        }

        self.delay(self.config.typed_settle_ms).await;
        Ok(())
    }

    fn cadence(&mut self, ch: char) -> Duration {
        let base = if is_cjk(ch) {
            self.config.typing_base_cjk_ms
        } else {
            self.config.typing_base_latin_ms
        };
        let jitter = self.rng.gen_range(0..=self.config.typing_jitter_ms);
        Duration::from_millis(base + jitter)
    }
}

fn is_cjk(ch: char) -> bool {
    ('\u{4e00}'..='\u{9fa5}').contains(&ch)
}

/// Computes multi-step pointer trajectories, click offsets, and the
/// opportunistic wander/browse moves injected between protocol stages.
#[derive(Debug)]
pub struct PointerChoreographer {
    config: HumanSection,
    last_point: Option<Point>,
    rng: ThreadRng,
}

impl PointerChoreographer {
    pub fn new(config: HumanSection) -> Self {
        Self {
            config,
            last_point: None,
            rng: thread_rng(),
        }
    }

    /// Moves the pointer to a jittered point inside the target and clicks
    /// once. Targets without resolvable geometry get a direct element click.
    pub async fn move_and_click(
        &mut self,
        page: &Page,
        target: &InteractionTarget,
        timing: &mut TimingModel,
    ) -> BrowserResult<()> {
        let Some(bbox) = &target.bbox else {
            target.element.click().await.map_err(|err| {
                BrowserError::Unexpected(format!("failed to click element directly: {err}"))
            })?;
            timing.delay(self.config.post_click_pause_ms).await;
            return Ok(());
        };

        let [offset_x, offset_y] = self.config.click_offset_px;
        let point = Point::new(
            bbox.x + bbox.width / 2.0 + self.rng.gen_range(-offset_x..=offset_x),
            bbox.y + bbox.height / 2.0 + self.rng.gen_range(-offset_y..=offset_y),
        );

        self.travel(page, point).await?;
        timing.delay(self.config.arrival_pause_ms).await;
        page.click(point)
            .await
            .map_err(|err| BrowserError::Unexpected(format!("failed to click point: {err}")))?;
        timing.delay(self.config.post_click_pause_ms).await;
        Ok(())
    }

    /// Issues a few pointer moves to random viewport coordinates with short
    /// settle pauses. Not tied to any functional stage.
    pub async fn wander(
        &mut self,
        page: &Page,
        viewport: &ViewportSpec,
        timing: &mut TimingModel,
    ) -> BrowserResult<()> {
        let [min_moves, max_moves] = self.config.wander_moves;
        let moves = self.rng.gen_range(min_moves..=max_moves.max(min_moves));
        for _ in 0..moves {
            let point = Point::new(
                self.rng.gen_range(0.0..viewport.width as f64),
                self.rng.gen_range(0.0..viewport.height as f64),
            );
            self.travel(page, point).await?;
            timing.delay(self.config.wander_pause_ms).await;
        }
        Ok(())
    }

    /// Smooth downward scrolls with reading pauses, then back to the top.
    pub async fn simulate_browsing(
        &mut self,
        page: &Page,
        timing: &mut TimingModel,
    ) -> BrowserResult<()> {
        let [min_bursts, max_bursts] = self.config.scroll_bursts;
        let bursts = self.rng.gen_range(min_bursts..=max_bursts.max(min_bursts));
        let [min_px, max_px] = self.config.scroll_distance_px;
        for _ in 0..bursts {
            let distance = self.rng.gen_range(min_px..=max_px.max(min_px));
            let script = format!("window.scrollBy({{ top: {distance}, behavior: 'smooth' }});");
            page.evaluate(script.as_str()).await.map_err(|err| {
                BrowserError::Unexpected(format!("failed to execute scroll script: {err}"))
            })?;
            timing.delay(self.config.reading_pause_ms).await;
        }
        page.evaluate("window.scrollTo({ top: 0, behavior: 'smooth' });")
            .await
            .map_err(|err| {
                BrowserError::Unexpected(format!("failed to scroll back to top: {err}"))
            })?;
        timing.delay(self.config.scroll_top_pause_ms).await;
        Ok(())
    }

    async fn travel(&mut self, page: &Page, target: Point) -> BrowserResult<()> {
        let start = self.last_point.unwrap_or_else(|| Point::new(0.0, 0.0));
        let [min_steps, max_steps] = self.config.move_steps;
        let steps = self.rng.gen_range(min_steps..=max_steps.max(min_steps)) as usize;
        for index in 1..=steps {
            let t = index as f64 / steps as f64;
            let eased = ease_in_out_cubic(t);
            let intermediate = Point::new(
                start.x + (target.x - start.x) * eased,
                start.y + (target.y - start.y) * eased,
            );
            page.move_mouse(intermediate)
                .await
                .map_err(|err| BrowserError::Unexpected(format!("failed to move mouse: {err}")))?;
            let [min_pause, max_pause] = self.config.step_pause_ms;
            let pause = self.rng.gen_range(min_pause..=max_pause.max(min_pause));
            sleep(Duration::from_millis(pause)).await;
        }
        self.last_point = Some(target);
        Ok(())
    }
}

fn ease_in_out_cubic(t: f64) -> f64 {
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> TimingModel {
        TimingModel::new(HumanSection::default())
    }

    #[test]
    fn sample_stays_within_bounds() {
        let mut timing = model();
        for _ in 0..200 {
            let duration = timing.sample([80, 200]);
            assert!(duration >= Duration::from_millis(80));
            assert!(duration <= Duration::from_millis(200));
        }
    }

    #[test]
    fn sample_tolerates_reversed_bounds() {
        let mut timing = model();
        let duration = timing.sample([500, 100]);
        assert!(duration >= Duration::from_millis(100));
        assert!(duration <= Duration::from_millis(500));
    }

    #[test]
    fn typing_plan_commits_exactly_the_input() {
        let mut timing = model();
        let inputs = [
            "short",
            "a much longer sentence that will admit corrections",
            "测试标题测试标题测试标题超过二十字限制",
            "混合 mixed 输入 with spaces",
        ];
        for input in inputs {
            for _ in 0..50 {
                let plan = timing.typing_plan(input);
                assert_eq!(plan.committed_text(), input);
            }
        }
    }

    #[test]
    fn short_strings_never_plan_corrections() {
        let mut timing = model();
        for _ in 0..100 {
            let plan = timing.typing_plan("十个字以内");
            assert!(plan
                .events
                .iter()
                .all(|event| matches!(event, TypingEvent::Key { .. })));
        }
    }

    #[test]
    fn key_delays_respect_cadence_ceiling() {
        let mut timing = model();
        let config = HumanSection::default();
        let ceiling = Duration::from_millis(
            config
                .thinking_pause_ms[1]
                .max(config.typing_base_latin_ms + config.typing_jitter_ms),
        );
        let plan = timing.typing_plan("an input string long enough to sample many delays");
        for event in &plan.events {
            if let TypingEvent::Key { delay, .. } = event {
                assert!(*delay <= ceiling);
            }
        }
    }

    #[test]
    fn cjk_detection_uses_ideograph_range() {
        assert!(is_cjk('测'));
        assert!(is_cjk('一'));
        assert!(!is_cjk('a'));
        assert!(!is_cjk('。'));
    }

    #[test]
    fn easing_is_monotonic_between_endpoints() {
        assert_eq!(ease_in_out_cubic(0.0), 0.0);
        assert!((ease_in_out_cubic(1.0) - 1.0).abs() < 1e-9);
        let mut previous = 0.0;
        for index in 1..=100 {
            let value = ease_in_out_cubic(index as f64 / 100.0);
            assert!(value >= previous);
            previous = value;
        }
    }
}
