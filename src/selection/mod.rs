// Multi-select state machine for line lists
//
// Pure and synchronous: the controller never touches I/O or clocks, so an
// identical ordered sequence plus an identical event sequence always yields
// the identical final state. The caller supplies the ordered id slice on
// every activation; the controller holds no opinion about ordering.
//
// The anchor is the reference id from which ranges are computed. It can
// outlive its own selection membership: toggling the anchor line off keeps
// the anchor id for future range gestures.

use std::collections::HashSet;

pub type LineId = i64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub toggle: bool,
    pub range: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        toggle: false,
        range: false,
    };
    pub const TOGGLE: Modifiers = Modifiers {
        toggle: true,
        range: false,
    };
    pub const RANGE: Modifiers = Modifiers {
        toggle: false,
        range: true,
    };
}

#[derive(Debug, Clone, Default)]
pub struct RangeSelectionController {
    selected: HashSet<LineId>,
    anchor: Option<LineId>,
}

impl RangeSelectionController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one activation gesture against the current ordered sequence.
    ///
    /// - plain: select exactly `id`, move the anchor to it
    /// - toggle: flip membership of `id`, leave everything else alone
    /// - range: replace the selection with the inclusive span between the
    ///   anchor and `id` positions (order-independent); the anchor stays put
    ///   so the range can be extended repeatedly
    ///
    /// A range gesture with no anchor, or whose anchor or target is absent
    /// from `ordered`, degrades to plain selection. Range wins when both
    /// modifiers are set.
    pub fn activate(&mut self, ordered: &[LineId], id: LineId, modifiers: Modifiers) {
        if modifiers.range {
            if let Some(anchor) = self.anchor {
                let anchor_pos = ordered.iter().position(|&x| x == anchor);
                let target_pos = ordered.iter().position(|&x| x == id);
                if let (Some(a), Some(b)) = (anchor_pos, target_pos) {
                    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
                    self.selected = ordered[lo..=hi].iter().copied().collect();
                    return;
                }
            }
            // unresolvable anchor or target: fall through to plain select
        } else if modifiers.toggle {
            if !self.selected.remove(&id) {
                self.selected.insert(id);
            }
            return;
        }

        self.selected.clear();
        self.selected.insert(id);
        self.anchor = Some(id);
    }

    pub fn is_selected(&self, id: LineId) -> bool {
        self.selected.contains(&id)
    }

    /// Stable view of the selection, sorted by id. Insertion order is
    /// deliberately not observable.
    pub fn selected(&self) -> Vec<LineId> {
        let mut ids: Vec<LineId> = self.selected.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn anchor(&self) -> Option<LineId> {
        self.anchor
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn clear(&mut self) {
        self.selected.clear();
        self.anchor = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEQ: [LineId; 5] = [10, 20, 30, 40, 50];

    #[test]
    fn test_plain_select_replaces_and_anchors() {
        let mut sel = RangeSelectionController::new();
        sel.activate(&SEQ, 20, Modifiers::NONE);
        sel.activate(&SEQ, 40, Modifiers::NONE);

        assert_eq!(sel.selected(), vec![40]);
        assert_eq!(sel.anchor(), Some(40));
    }

    #[test]
    fn test_range_symmetry() {
        // b then shift-d selects {b,c,d}; d then shift-b selects the same span
        let mut forward = RangeSelectionController::new();
        forward.activate(&SEQ, 20, Modifiers::NONE);
        forward.activate(&SEQ, 40, Modifiers::RANGE);
        assert_eq!(forward.selected(), vec![20, 30, 40]);

        let mut backward = RangeSelectionController::new();
        backward.activate(&SEQ, 40, Modifiers::NONE);
        backward.activate(&SEQ, 20, Modifiers::RANGE);
        assert_eq!(backward.selected(), vec![20, 30, 40]);
    }

    #[test]
    fn test_range_keeps_anchor_for_repeated_extension() {
        let mut sel = RangeSelectionController::new();
        sel.activate(&SEQ, 30, Modifiers::NONE);
        sel.activate(&SEQ, 50, Modifiers::RANGE);
        assert_eq!(sel.selected(), vec![30, 40, 50]);

        // Extending the other way still computes from the original anchor
        sel.activate(&SEQ, 10, Modifiers::RANGE);
        assert_eq!(sel.selected(), vec![10, 20, 30]);
        assert_eq!(sel.anchor(), Some(30));
    }

    #[test]
    fn test_toggle_idempotence() {
        let mut sel = RangeSelectionController::new();
        sel.activate(&SEQ, 20, Modifiers::NONE);
        sel.activate(&SEQ, 40, Modifiers::TOGGLE);
        assert_eq!(sel.selected(), vec![20, 40]);

        sel.activate(&SEQ, 40, Modifiers::TOGGLE);
        sel.activate(&SEQ, 40, Modifiers::TOGGLE);
        assert_eq!(sel.selected(), vec![20, 40]);
        assert_eq!(sel.anchor(), Some(20));
    }

    #[test]
    fn test_anchor_survives_toggling_itself_off() {
        let mut sel = RangeSelectionController::new();
        sel.activate(&SEQ, 30, Modifiers::NONE);
        sel.activate(&SEQ, 30, Modifiers::TOGGLE);
        assert!(sel.is_empty());
        assert_eq!(sel.anchor(), Some(30));

        // A later range gesture still resolves against the retained anchor
        sel.activate(&SEQ, 50, Modifiers::RANGE);
        assert_eq!(sel.selected(), vec![30, 40, 50]);
    }

    #[test]
    fn test_range_without_anchor_degrades_to_plain() {
        let mut sel = RangeSelectionController::new();
        sel.activate(&SEQ, 30, Modifiers::RANGE);

        assert_eq!(sel.selected(), vec![30]);
        assert_eq!(sel.anchor(), Some(30));
    }

    #[test]
    fn test_range_with_unresolvable_anchor_degrades_to_plain() {
        let mut sel = RangeSelectionController::new();
        sel.activate(&SEQ, 20, Modifiers::NONE);

        // The anchor line disappeared from the sequence (e.g. re-segmented)
        let reordered: [LineId; 3] = [30, 40, 50];
        sel.activate(&reordered, 40, Modifiers::RANGE);

        assert_eq!(sel.selected(), vec![40]);
        assert_eq!(sel.anchor(), Some(40));
    }

    #[test]
    fn test_range_wins_over_toggle() {
        let mut sel = RangeSelectionController::new();
        sel.activate(&SEQ, 10, Modifiers::NONE);
        sel.activate(
            &SEQ,
            30,
            Modifiers {
                toggle: true,
                range: true,
            },
        );
        assert_eq!(sel.selected(), vec![10, 20, 30]);
    }

    #[test]
    fn test_order_change_between_calls() {
        // The controller is stateless with respect to the sequence: a
        // reordering between gestures changes which span a range covers
        let mut sel = RangeSelectionController::new();
        sel.activate(&SEQ, 20, Modifiers::NONE);

        let reordered: [LineId; 5] = [50, 40, 30, 20, 10];
        sel.activate(&reordered, 40, Modifiers::RANGE);
        assert_eq!(sel.selected(), vec![20, 30, 40]);
    }

    #[test]
    fn test_clear_empties_both_fields() {
        let mut sel = RangeSelectionController::new();
        sel.activate(&SEQ, 20, Modifiers::NONE);
        sel.activate(&SEQ, 40, Modifiers::RANGE);

        sel.clear();
        assert!(sel.is_empty());
        assert_eq!(sel.anchor(), None);
    }

    #[test]
    fn test_replay_determinism() {
        // Identical sequence + identical gestures => identical final state
        let gestures: Vec<(LineId, Modifiers)> = vec![
            (20, Modifiers::NONE),
            (40, Modifiers::RANGE),
            (30, Modifiers::TOGGLE),
            (50, Modifiers::TOGGLE),
            (10, Modifiers::RANGE),
            (10, Modifiers::TOGGLE),
        ];

        let run = || {
            let mut sel = RangeSelectionController::new();
            for &(id, modifiers) in &gestures {
                sel.activate(&SEQ, id, modifiers);
            }
            (sel.selected(), sel.anchor())
        };

        let first = run();
        for _ in 0..10 {
            assert_eq!(run(), first);
        }
    }
}
