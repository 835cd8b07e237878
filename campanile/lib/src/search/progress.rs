//! The progress estimate.
//!
//! Rotational sorting makes the search tree heavily asymmetric at the first slot: the first
//! choice rules many rotations out, so choice 0 owns far more of the tree than choice 1, and so
//! on.  A naive `choice / num_choices` fraction would crawl through the first choice and then
//! leap.  Instead, a precomputed table assigns each first-slot choice a decreasing share of the
//! whole search, and deeper slots are collapsed positionally so the fraction advances
//! approximately uniformly.

/// Per-first-slot-choice shares of the search, plus their running totals.
#[derive(Debug, Clone)]
pub(crate) struct ProgressTable {
    ratio: Vec<f64>,
    cumulative: Vec<f64>,
}

impl ProgressTable {
    pub fn new(num_first_choices: usize) -> Self {
        // Share of choice k is proportional to 1 / ((k + 1)(k + 2)), which telescopes to a
        // closed-form normalisation
        let raw: Vec<f64> = (0..num_first_choices)
            .map(|k| 1.0 / ((k + 1) as f64 * (k + 2) as f64))
            .collect();
        let total: f64 = raw.iter().sum();
        let ratio: Vec<f64> = raw.iter().map(|r| r / total).collect();
        let mut cumulative = Vec::with_capacity(num_first_choices);
        let mut acc = 0.0;
        for r in &ratio {
            cumulative.push(acc);
            acc += r;
        }
        ProgressTable { ratio, cumulative }
    }

    /// The fraction of the search completed, judged from the combined choice index of each
    /// currently occupied slot.
    pub fn fraction(&self, slot_choices: &[usize], choices_per_slot: usize) -> f32 {
        let first = match slot_choices.first() {
            Some(&c) => c.min(self.ratio.len() - 1),
            None => return 0.0,
        };
        // Positional fraction within the subtree of the first choice
        let mut inner = 0.0f64;
        let mut scale = 1.0f64;
        for &choice in &slot_choices[1..] {
            scale /= choices_per_slot as f64;
            inner += choice as f64 * scale;
        }
        (self.cumulative[first] + self.ratio[first] * inner).clamp(0.0, 1.0) as f32
    }
}
