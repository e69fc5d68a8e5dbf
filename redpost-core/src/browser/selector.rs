use std::time::{Duration, Instant};

use chromiumoxide::element::Element;
use chromiumoxide::layout::BoundingBox;
use chromiumoxide::page::Page;
use tokio::time::sleep;
use tracing::{debug, trace};

use crate::config::SelectorPattern;

/// A resolved handle to a live DOM element plus its geometry. Valid only for
/// the current page lifetime; never cached across navigations.
#[derive(Debug)]
pub struct InteractionTarget {
    pub element: Element,
    pub bbox: Option<BoundingBox>,
}

/// Ordered-fallback selector resolution. Absence is data, not an error:
/// callers decide whether an exhausted chain is fatal, skippable, or means
/// "already in the desired state".
#[derive(Debug, Clone, Copy)]
pub struct SelectorResolver<'a> {
    page: &'a Page,
    poll_interval: Duration,
}

impl<'a> SelectorResolver<'a> {
    pub fn new(page: &'a Page, poll_interval: Duration) -> Self {
        Self {
            page,
            poll_interval,
        }
    }

    /// Tries each pattern in order, waiting up to `per_attempt` for it to
    /// appear before degrading to the next. First structural match wins.
    pub async fn resolve(
        &self,
        chain: &[SelectorPattern],
        per_attempt: Duration,
    ) -> Option<InteractionTarget> {
        for pattern in chain {
            let deadline = Instant::now() + per_attempt;
            loop {
                if let Some(element) = self.try_pattern(pattern).await {
                    debug!(css = pattern.css(), "selector matched");
                    return Some(self.target(element).await);
                }
                if Instant::now() >= deadline {
                    trace!(css = pattern.css(), "selector attempt exhausted");
                    break;
                }
                sleep(self.poll_interval).await;
            }
        }
        None
    }

    /// Single-pass probe of the chain with no waiting. Used for best-effort
    /// checks such as the post-submit error banner.
    pub async fn probe(&self, chain: &[SelectorPattern]) -> Option<InteractionTarget> {
        let mut elements_by_pattern = Vec::with_capacity(chain.len());
        let mut snapshot = Vec::with_capacity(chain.len());
        for pattern in chain {
            let (elements, texts) = self.candidates(pattern).await;
            elements_by_pattern.push(elements);
            snapshot.push(texts);
        }
        let (pattern_index, candidate_index) = first_match(chain, &snapshot)?;
        let element = elements_by_pattern
            .swap_remove(pattern_index)
            .into_iter()
            .nth(candidate_index)?;
        Some(self.target(element).await)
    }

    /// All current matches for a bare CSS selector, in document order. DOM
    /// errors read as "no matches".
    pub async fn find_all(&self, css: &str) -> Vec<Element> {
        self.page.find_elements(css).await.unwrap_or_default()
    }

    /// Current matches for one pattern plus the candidate texts the selection
    /// decision runs on. Text is only fetched when the pattern constrains it.
    async fn candidates(&self, pattern: &SelectorPattern) -> (Vec<Element>, Vec<Option<String>>) {
        let elements = self.find_all(pattern.css()).await;
        let mut texts = Vec::with_capacity(elements.len());
        for element in &elements {
            let text = if pattern.required_text().is_some() {
                element.inner_text().await.ok().flatten()
            } else {
                None
            };
            texts.push(text);
        }
        (elements, texts)
    }

    async fn try_pattern(&self, pattern: &SelectorPattern) -> Option<Element> {
        let (elements, texts) = self.candidates(pattern).await;
        let index = choose_candidate(pattern.required_text(), &texts)?;
        elements.into_iter().nth(index)
    }

    async fn target(&self, element: Element) -> InteractionTarget {
        let bbox = element.bounding_box().await.ok();
        InteractionTarget { element, bbox }
    }
}

/// First viable candidate for one pattern: any element for a bare CSS
/// pattern, the first whose trimmed text contains the required fragment
/// otherwise.
pub(crate) fn choose_candidate(required: Option<&str>, texts: &[Option<String>]) -> Option<usize> {
    match required {
        None => (!texts.is_empty()).then_some(0),
        Some(required) => texts.iter().position(|text| {
            text.as_deref()
                .map(|text| text.trim().contains(required))
                .unwrap_or(false)
        }),
    }
}

/// Chain precedence over a snapshot of per-pattern candidates: the earliest
/// pattern with a viable candidate wins, however many later ones also match.
pub(crate) fn first_match(
    chain: &[SelectorPattern],
    snapshot: &[Vec<Option<String>>],
) -> Option<(usize, usize)> {
    chain
        .iter()
        .zip(snapshot)
        .enumerate()
        .find_map(|(index, (pattern, texts))| {
            choose_candidate(pattern.required_text(), texts)
                .map(|candidate| (index, candidate))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn css(selector: &str) -> SelectorPattern {
        SelectorPattern::Css(selector.to_string())
    }

    fn some(text: &str) -> Option<String> {
        Some(text.to_string())
    }

    #[test]
    fn second_pattern_wins_when_first_has_no_candidates() {
        let chain = vec![css(".a"), css(".b"), css(".c")];
        let snapshot = vec![vec![], vec![None], vec![None, None]];
        assert_eq!(first_match(&chain, &snapshot), Some((1, 0)));
    }

    #[test]
    fn exhausted_chain_resolves_to_nothing() {
        let chain = vec![css(".a"), css(".b")];
        let snapshot = vec![vec![], vec![]];
        assert_eq!(first_match(&chain, &snapshot), None);
    }

    #[test]
    fn text_constrained_pattern_skips_non_matching_candidates() {
        let texts = vec![some("视频"), some(" 图文 "), some("图文发布")];
        assert_eq!(choose_candidate(Some("图文"), &texts), Some(1));
        assert_eq!(choose_candidate(Some("直播"), &texts), None);
    }

    #[test]
    fn bare_css_pattern_takes_the_first_candidate() {
        assert_eq!(choose_candidate(None, &[None, None]), Some(0));
        assert_eq!(choose_candidate(None, &[]), None);
    }

    #[test]
    fn text_constraint_applies_within_the_winning_pattern() {
        let chain = vec![
            css(".missing"),
            SelectorPattern::WithText {
                css: ".tab-item".to_string(),
                text: "图文".to_string(),
            },
        ];
        let snapshot = vec![vec![], vec![some("视频"), some("图文")]];
        assert_eq!(first_match(&chain, &snapshot), Some((1, 1)));
    }
}
