//! The replicated drawing surface: pogs, lines, grid mode, shared view.
//!
//! `MapState` is a plain store. It applies mutations handed to it by the
//! session and enforces only local invariants (locked pogs refuse moves,
//! sort orders stay monotonic); *who* may mutate and *when* is the
//! session state machine's business. Line membership is owned by the
//! draw history, which recomputes it through [`crop_segment`] — the store
//! just holds the result.

use std::collections::BTreeMap;

use mapforge_protocol::{
    Card, GridMode, LineSegment, Pog, PogId, Point, Rect,
};

/// One node's copy of a drawing surface.
///
/// Each node holds two: the public (replicated) map and a private map for
/// card-backed pogs that never go on the wire.
#[derive(Debug, Default)]
pub struct MapState {
    pogs: BTreeMap<PogId, Pog>,
    lines: Vec<LineSegment>,
    grid: GridMode,
    view_center: Point,
    zoom: u32,
    next_sort: u64,
}

impl MapState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops everything; used when a new hosting session starts from a
    /// clean authoritative slate.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    // -- Pogs --------------------------------------------------------------

    /// Mints the next sort order (draw order) for a new pog.
    pub fn next_sort_order(&mut self) -> u64 {
        let sort = self.next_sort;
        self.next_sort += 1;
        sort
    }

    pub fn pog(&self, id: PogId) -> Option<&Pog> {
        self.pogs.get(&id)
    }

    pub fn pog_count(&self) -> usize {
        self.pogs.len()
    }

    /// Pogs in draw order: lowest sort order first (drawn underneath).
    pub fn pogs_in_draw_order(&self) -> Vec<&Pog> {
        let mut pogs: Vec<&Pog> = self.pogs.values().collect();
        pogs.sort_by_key(|p| (p.sort_order, p.id));
        pogs
    }

    /// Inserts or replaces a pog. Re-applying the same pog (a host echo of
    /// our own optimistic add) is a no-op by construction.
    pub fn add_pog(&mut self, pog: Pog) {
        self.next_sort = self.next_sort.max(pog.sort_order + 1);
        self.pogs.insert(pog.id, pog);
    }

    /// Removes the listed pogs, returning the ones that existed.
    pub fn remove_pogs(&mut self, ids: &[PogId]) -> Vec<Pog> {
        ids.iter().filter_map(|id| self.pogs.remove(id)).collect()
    }

    /// Removes every pog backed by one of the given cards.
    pub fn remove_card_pogs(&mut self, cards: &[Card]) -> Vec<PogId> {
        let doomed: Vec<PogId> = self
            .pogs
            .values()
            .filter(|pog| {
                pog.card.as_ref().is_some_and(|c| cards.contains(c))
            })
            .map(|pog| pog.id)
            .collect();
        for id in &doomed {
            self.pogs.remove(id);
        }
        doomed
    }

    /// Removes every pog backed by a card of the named deck.
    pub fn remove_deck_pogs(&mut self, deck_name: &str) -> Vec<PogId> {
        let doomed: Vec<PogId> = self
            .pogs
            .values()
            .filter(|pog| {
                pog.card.as_ref().is_some_and(|c| c.deck_name == deck_name)
            })
            .map(|pog| pog.id)
            .collect();
        for id in &doomed {
            self.pogs.remove(id);
        }
        doomed
    }

    /// Moves a pog. Locked pogs refuse; returns whether anything changed.
    pub fn move_pog(&mut self, id: PogId, position: Point) -> bool {
        match self.pogs.get_mut(&id) {
            Some(pog) if !pog.locked => {
                pog.position = position;
                true
            }
            _ => false,
        }
    }

    /// Renames a pog and edits its attribute map.
    pub fn set_pog_data(
        &mut self,
        id: PogId,
        name: Option<&str>,
        set: &BTreeMap<String, String>,
        clear: &[String],
    ) -> bool {
        let Some(pog) = self.pogs.get_mut(&id) else {
            return false;
        };
        if let Some(name) = name {
            pog.name = name.to_string();
        }
        for (key, value) in set {
            pog.attributes.insert(key.clone(), value.clone());
        }
        for key in clear {
            pog.attributes.remove(key);
        }
        true
    }

    /// Applies a bulk z-order reassignment.
    pub fn reorder_pogs(&mut self, orders: &[(PogId, u64)]) -> bool {
        let mut changed = false;
        for (id, sort) in orders {
            if let Some(pog) = self.pogs.get_mut(id) {
                pog.sort_order = *sort;
                self.next_sort = self.next_sort.max(sort + 1);
                changed = true;
            }
        }
        changed
    }

    pub fn set_pog_size(&mut self, id: PogId, face_size: u32) -> bool {
        match self.pogs.get_mut(&id) {
            Some(pog) => {
                pog.face_size = face_size;
                true
            }
            None => false,
        }
    }

    pub fn rotate_pog(&mut self, id: PogId, angle: f32) -> bool {
        match self.pogs.get_mut(&id) {
            Some(pog) => {
                pog.angle = angle;
                true
            }
            None => false,
        }
    }

    pub fn flip_pog(&mut self, id: PogId, horizontal: bool, vertical: bool) -> bool {
        match self.pogs.get_mut(&id) {
            Some(pog) => {
                pog.flip_horizontal = horizontal;
                pog.flip_vertical = vertical;
                true
            }
            None => false,
        }
    }

    pub fn lock_pog(&mut self, id: PogId, locked: bool) -> bool {
        match self.pogs.get_mut(&id) {
            Some(pog) => {
                pog.locked = locked;
                true
            }
            None => false,
        }
    }

    // -- Lines -------------------------------------------------------------

    pub fn lines(&self) -> &[LineSegment] {
        &self.lines
    }

    /// Replaces the line set with a history recomputation.
    pub fn set_lines(&mut self, lines: Vec<LineSegment>) {
        self.lines = lines;
    }

    // -- Grid and view -----------------------------------------------------

    pub fn grid(&self) -> GridMode {
        self.grid
    }

    pub fn set_grid(&mut self, grid: GridMode) {
        self.grid = grid;
    }

    pub fn view(&self) -> (Point, u32) {
        (self.view_center, self.zoom)
    }

    pub fn set_view(&mut self, center: Point, zoom: u32) {
        self.view_center = center;
        self.zoom = zoom;
    }
}

// ---------------------------------------------------------------------------
// Erase geometry
// ---------------------------------------------------------------------------

/// Crops one segment against an erase rectangle.
///
/// The portion inside the rectangle is destroyed; up to two survivor
/// segments (the parts before and after the rectangle) are returned. A
/// segment the rectangle never touches comes back unchanged. With
/// `color_specific` set, segments of any other color are untouched.
///
/// Liang–Barsky: the segment is `p(t) = start + t * d` for `t ∈ [0, 1]`;
/// each rectangle edge clips the inside interval `[t_in, t_out]`.
pub fn crop_segment(
    segment: &LineSegment,
    rect: &Rect,
    color_specific: bool,
    color: u32,
) -> Vec<LineSegment> {
    if color_specific && segment.color != color {
        return vec![*segment];
    }

    let x0 = f64::from(segment.start.x);
    let y0 = f64::from(segment.start.y);
    let dx = f64::from(segment.end.x) - x0;
    let dy = f64::from(segment.end.y) - y0;

    let min_x = f64::from(rect.min_x());
    let max_x = f64::from(rect.max_x());
    let min_y = f64::from(rect.min_y());
    let max_y = f64::from(rect.max_y());

    // Degenerate (zero-length) strokes: a dot is erased iff inside.
    if dx == 0.0 && dy == 0.0 {
        return if rect.contains(segment.start) {
            Vec::new()
        } else {
            vec![*segment]
        };
    }

    let mut t_in = 0.0f64;
    let mut t_out = 1.0f64;
    for (p, q) in [
        (-dx, x0 - min_x),
        (dx, max_x - x0),
        (-dy, y0 - min_y),
        (dy, max_y - y0),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                // Parallel to this edge and entirely outside it: the
                // rectangle never touches the segment.
                return vec![*segment];
            }
        } else {
            let t = q / p;
            if p < 0.0 {
                if t > t_out {
                    return vec![*segment];
                }
                if t > t_in {
                    t_in = t;
                }
            } else {
                if t < t_in {
                    return vec![*segment];
                }
                if t < t_out {
                    t_out = t;
                }
            }
        }
    }

    let at = |t: f64| Point {
        x: (x0 + t * dx).round() as i32,
        y: (y0 + t * dy).round() as i32,
    };

    let mut survivors = Vec::with_capacity(2);
    if t_in > 0.0 {
        let piece = LineSegment::new(segment.start, at(t_in), segment.color);
        if piece.start != piece.end {
            survivors.push(piece);
        }
    }
    if t_out < 1.0 {
        let piece = LineSegment::new(at(t_out), segment.end, segment.color);
        if piece.start != piece.end {
            survivors.push(piece);
        }
    }
    survivors
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapforge_protocol::{PlayerId, PogId};
    use std::collections::BTreeMap;

    fn pog(id: u32, sort: u64) -> Pog {
        Pog {
            id: PogId::compose(PlayerId(0), id),
            sort_order: sort,
            position: Point::new(0, 0),
            filename: "pogs/goblin.png".to_string(),
            face_size: 1,
            angle: 0.0,
            scale: 1.0,
            flip_horizontal: false,
            flip_vertical: false,
            locked: false,
            tinted: false,
            name: String::new(),
            attributes: BTreeMap::new(),
            card: None,
        }
    }

    fn seg(x0: i32, y0: i32, x1: i32, y1: i32) -> LineSegment {
        LineSegment::new(Point::new(x0, y0), Point::new(x1, y1), 0xFF000000)
    }

    // -- Pog store ---------------------------------------------------------

    #[test]
    fn test_add_pog_advances_sort_minting() {
        let mut map = MapState::new();
        map.add_pog(pog(1, 10));
        assert_eq!(map.next_sort_order(), 11);
    }

    #[test]
    fn test_readding_same_pog_is_idempotent() {
        // Host echoes of our own optimistic add must be harmless no-ops.
        let mut map = MapState::new();
        map.add_pog(pog(1, 0));
        map.add_pog(pog(1, 0));
        assert_eq!(map.pog_count(), 1);
    }

    #[test]
    fn test_draw_order_sorts_by_sort_order() {
        let mut map = MapState::new();
        map.add_pog(pog(1, 5));
        map.add_pog(pog(2, 2));
        map.add_pog(pog(3, 9));
        let order: Vec<u64> =
            map.pogs_in_draw_order().iter().map(|p| p.sort_order).collect();
        assert_eq!(order, vec![2, 5, 9]);
    }

    #[test]
    fn test_locked_pog_refuses_moves() {
        let mut map = MapState::new();
        let id = pog(1, 0).id;
        map.add_pog(pog(1, 0));
        assert!(map.lock_pog(id, true));

        assert!(!map.move_pog(id, Point::new(50, 50)));
        assert_eq!(map.pog(id).unwrap().position, Point::new(0, 0));

        assert!(map.lock_pog(id, false));
        assert!(map.move_pog(id, Point::new(50, 50)));
        assert_eq!(map.pog(id).unwrap().position, Point::new(50, 50));
    }

    #[test]
    fn test_set_pog_data_edits_name_and_attributes() {
        let mut map = MapState::new();
        let id = pog(1, 0).id;
        map.add_pog(pog(1, 0));

        let mut set = BTreeMap::new();
        set.insert("HP".to_string(), "12".to_string());
        set.insert("AC".to_string(), "15".to_string());
        assert!(map.set_pog_data(id, Some("Grubnash"), &set, &[]));

        let clear = vec!["AC".to_string()];
        assert!(map.set_pog_data(id, None, &BTreeMap::new(), &clear));

        let pog = map.pog(id).unwrap();
        assert_eq!(pog.name, "Grubnash");
        assert_eq!(pog.attributes.get("HP").map(String::as_str), Some("12"));
        assert!(!pog.attributes.contains_key("AC"));
    }

    #[test]
    fn test_remove_card_pogs_matches_embedded_card() {
        let mut map = MapState::new();
        let card = Card {
            deck_name: "Tarot".into(),
            card_name: "The Fool".into(),
            art_file: "cards/fool.png".into(),
            description: String::new(),
        };
        let mut card_pog = pog(1, 0);
        card_pog.card = Some(card.clone());
        map.add_pog(card_pog);
        map.add_pog(pog(2, 1));

        let removed = map.remove_card_pogs(std::slice::from_ref(&card));
        assert_eq!(removed.len(), 1);
        assert_eq!(map.pog_count(), 1);
    }

    // -- Erase geometry ----------------------------------------------------

    fn erase_rect() -> Rect {
        Rect::new(0, 0, 10, 10)
    }

    #[test]
    fn test_crop_segment_fully_inside_is_destroyed() {
        let survivors =
            crop_segment(&seg(2, 2, 8, 8), &erase_rect(), false, 0);
        assert!(survivors.is_empty());
    }

    #[test]
    fn test_crop_segment_fully_outside_is_untouched() {
        let original = seg(20, 20, 30, 25);
        let survivors = crop_segment(&original, &erase_rect(), false, 0);
        assert_eq!(survivors, vec![original]);
    }

    #[test]
    fn test_crop_segment_crossing_yields_two_pieces() {
        let survivors =
            crop_segment(&seg(-10, 5, 20, 5), &erase_rect(), false, 0);
        assert_eq!(survivors.len(), 2);
        assert_eq!(survivors[0].start, Point::new(-10, 5));
        assert_eq!(survivors[0].end, Point::new(0, 5));
        assert_eq!(survivors[1].start, Point::new(10, 5));
        assert_eq!(survivors[1].end, Point::new(20, 5));
    }

    #[test]
    fn test_crop_segment_one_endpoint_inside_yields_one_piece() {
        let survivors =
            crop_segment(&seg(5, 5, 20, 5), &erase_rect(), false, 0);
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].start, Point::new(10, 5));
        assert_eq!(survivors[0].end, Point::new(20, 5));
    }

    #[test]
    fn test_crop_segment_vertical_line() {
        let survivors =
            crop_segment(&seg(5, -10, 5, 20), &erase_rect(), false, 0);
        assert_eq!(survivors.len(), 2);
        assert_eq!(survivors[0].end, Point::new(5, 0));
        assert_eq!(survivors[1].start, Point::new(5, 10));
    }

    #[test]
    fn test_crop_segment_parallel_outside_edge_is_untouched() {
        // Horizontal line above the rectangle: parallel to the x-edges,
        // outside the y range.
        let original = seg(-5, 15, 15, 15);
        let survivors = crop_segment(&original, &erase_rect(), false, 0);
        assert_eq!(survivors, vec![original]);
    }

    #[test]
    fn test_crop_segment_color_specific_skips_other_colors() {
        let mut red = seg(2, 2, 8, 8);
        red.color = 0xFFFF0000;
        let survivors = crop_segment(&red, &erase_rect(), true, 0xFF00FF00);
        assert_eq!(survivors, vec![red], "wrong color is untouched");

        let survivors = crop_segment(&red, &erase_rect(), true, 0xFFFF0000);
        assert!(survivors.is_empty(), "matching color is erased");
    }

    #[test]
    fn test_crop_segment_dot_inside_is_destroyed() {
        assert!(crop_segment(&seg(5, 5, 5, 5), &erase_rect(), false, 0).is_empty());
        let outside = seg(50, 50, 50, 50);
        assert_eq!(
            crop_segment(&outside, &erase_rect(), false, 0),
            vec![outside]
        );
    }
}
