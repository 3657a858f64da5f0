//! Windowed rendering of long, fixed-height lists.
//!
//! Only the rows intersecting the viewport, plus `overscan` rows on each side,
//! need to be rendered. [`visible_window`] projects a scroll offset onto that
//! index range; [`WindowedList`] keeps the inputs and recomputes the range
//! whenever the scroll offset or the viewport changes.

/// Static geometry of a list.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ListMetrics {
    pub item_count: usize,
    /// Height of one row, in pixels.
    pub item_height: f64,
    /// Height of the visible area, in pixels.
    pub viewport_height: f64,
    /// Extra rows rendered above and below the viewport.
    pub overscan: usize,
}

/// The rows to render and where to place them.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VisibleWindow {
    pub start_index: usize,
    /// Inclusive.
    pub end_index: usize,
    /// Offset of `start_index` from the top of the list, in pixels.
    pub offset_y: f64,
    /// Height of the whole list, in pixels.
    pub total_height: f64,
}

impl VisibleWindow {
    /// Number of rows to render; a window always holds at least one.
    pub fn len(&self) -> usize {
        self.end_index - self.start_index + 1
    }

    pub fn indices(&self) -> std::ops::RangeInclusive<usize> {
        self.start_index..=self.end_index
    }
}

/// Negative, NaN and infinite pixel values count as zero.
fn clamp_px(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Rows visible at `scroll_top`, or `None` when there is nothing to render
/// (no items, or a zero item height).
///
/// `end_index - start_index` equals `capacity + 2 * overscan` unless the
/// window is clamped by either end of the list, where `capacity` is the
/// number of rows the viewport can show. When `scroll_top` is a multiple of
/// the row height this renders one row below the viewport on top of the
/// overscan.
pub fn visible_window(metrics: &ListMetrics, scroll_top: f64) -> Option<VisibleWindow> {
    let item_height = clamp_px(metrics.item_height);
    if metrics.item_count == 0 || item_height == 0.0 {
        return None;
    }

    let last = metrics.item_count - 1;
    let scroll_top = clamp_px(scroll_top);
    let viewport = clamp_px(metrics.viewport_height);

    // Float-to-int casts saturate, so huge offsets land on the last row.
    let first = ((scroll_top / item_height).floor() as usize).min(last);
    let capacity = (viewport / item_height).ceil() as usize;

    let start_index = first.saturating_sub(metrics.overscan);
    let end_index = first
        .saturating_add(capacity)
        .saturating_add(metrics.overscan)
        .min(last);

    Some(VisibleWindow {
        start_index,
        end_index,
        offset_y: start_index as f64 * item_height,
        total_height: metrics.item_count as f64 * item_height,
    })
}

/// A list that tracks its scroll position and viewport and keeps the
/// visible window up to date.
#[derive(Debug, Clone)]
pub struct WindowedList<T> {
    items: Vec<T>,
    item_height: f64,
    viewport_height: f64,
    overscan: usize,
    scroll_top: f64,
    window: Option<VisibleWindow>,
}

impl<T> WindowedList<T> {
    pub fn new(items: Vec<T>, item_height: f64, viewport_height: f64, overscan: usize) -> Self {
        let mut list = Self {
            items,
            item_height: clamp_px(item_height),
            viewport_height: clamp_px(viewport_height),
            overscan,
            scroll_top: 0.0,
            window: None,
        };
        list.recompute();
        list
    }

    pub fn metrics(&self) -> ListMetrics {
        ListMetrics {
            item_count: self.items.len(),
            item_height: self.item_height,
            viewport_height: self.viewport_height,
            overscan: self.overscan,
        }
    }

    fn recompute(&mut self) {
        self.window = visible_window(&self.metrics(), self.scroll_top);
    }

    /// Largest meaningful scroll offset.
    pub fn max_scroll_top(&self) -> f64 {
        (self.items.len() as f64 * self.item_height - self.viewport_height).max(0.0)
    }

    /// Move to `scroll_top`. Returns `true` when the visible window changed.
    pub fn scroll_to(&mut self, scroll_top: f64) -> bool {
        let scroll_top = clamp_px(scroll_top).min(self.max_scroll_top());
        if scroll_top == self.scroll_top {
            return false;
        }
        self.scroll_top = scroll_top;
        let previous = self.window;
        self.recompute();
        previous != self.window
    }

    /// Scroll so that row `index` sits at the top of the viewport.
    pub fn scroll_to_index(&mut self, index: usize) -> bool {
        self.scroll_to(index as f64 * self.item_height)
    }

    /// Change the viewport height. Returns `true` when the visible window
    /// changed.
    pub fn resize(&mut self, viewport_height: f64) -> bool {
        let viewport_height = clamp_px(viewport_height);
        if viewport_height == self.viewport_height {
            return false;
        }
        self.viewport_height = viewport_height;
        self.scroll_top = self.scroll_top.min(self.max_scroll_top());
        let previous = self.window;
        self.recompute();
        previous != self.window
    }

    /// Replace the items, keeping the scroll position when still reachable.
    pub fn set_items(&mut self, items: Vec<T>) {
        self.items = items;
        self.scroll_top = self.scroll_top.min(self.max_scroll_top());
        self.recompute();
    }

    pub fn scroll_top(&self) -> f64 {
        self.scroll_top
    }

    pub fn window(&self) -> Option<VisibleWindow> {
        self.window
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Rows to render, with their absolute index.
    pub fn visible(&self) -> impl Iterator<Item = (usize, &T)> {
        let range = match self.window {
            Some(window) => window.start_index..window.end_index + 1,
            None => 0..0,
        };
        range.clone().zip(&self.items[range])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(item_count: usize) -> ListMetrics {
        ListMetrics {
            item_count,
            item_height: 40.0,
            viewport_height: 400.0,
            overscan: 3,
        }
    }

    #[test]
    fn top_of_a_long_list() {
        let window = visible_window(&metrics(1000), 0.0).unwrap();

        assert_eq!(window.start_index, 0);
        assert!(window.end_index >= 9);
        assert_eq!(window.end_index, 13);
        assert_eq!(window.offset_y, 0.0);
        assert_eq!(window.total_height, 40_000.0);
    }

    #[test]
    fn middle_of_the_list_has_overscan_on_both_sides() {
        let window = visible_window(&metrics(1000), 4000.0).unwrap();

        assert_eq!(window.start_index, 97);
        assert_eq!(window.end_index, 113);
        assert_eq!(window.end_index - window.start_index, 10 + 2 * 3);
        assert_eq!(window.offset_y, 97.0 * 40.0);
    }

    #[test]
    fn unclamped_window_spans_capacity_plus_overscan_at_any_offset() {
        let m = metrics(1000);
        for scroll_top in [4000.0, 4001.0, 4020.0, 4039.5, 12_345.0] {
            let window = visible_window(&m, scroll_top).unwrap();

            assert_eq!(window.end_index - window.start_index, 10 + 2 * 3);
            assert!(window.offset_y <= scroll_top);
            let viewport_bottom = scroll_top + m.viewport_height;
            assert!((window.end_index + 1) as f64 * m.item_height >= viewport_bottom);
        }
    }

    #[test]
    fn partial_row_scroll_still_starts_at_the_covering_row() {
        let window = visible_window(&metrics(1000), 4019.0).unwrap();

        assert_eq!(window.start_index, 97);
        assert_eq!(window.offset_y, 3880.0);
    }

    #[test]
    fn end_of_the_list_is_clamped() {
        let window = visible_window(&metrics(20), 10_000.0).unwrap();

        assert_eq!(window.end_index, 19);
        assert!(window.start_index <= window.end_index);
    }

    #[test]
    fn short_list_fits_entirely() {
        let window = visible_window(&metrics(4), 0.0).unwrap();

        assert_eq!(window.indices(), 0..=3);
        assert_eq!(window.len(), 4);
    }

    #[test]
    fn negative_inputs_clamp_to_zero() {
        let mut m = metrics(1000);
        m.viewport_height = -50.0;

        let window = visible_window(&m, -300.0).unwrap();

        assert_eq!(window.start_index, 0);
        assert_eq!(window.end_index, 3);
        assert_eq!(window.offset_y, 0.0);
    }

    #[test]
    fn nothing_to_render() {
        assert_eq!(visible_window(&metrics(0), 0.0), None);
        let mut m = metrics(10);
        m.item_height = 0.0;
        assert_eq!(visible_window(&m, 0.0), None);
        m.item_height = f64::NAN;
        assert_eq!(visible_window(&m, 0.0), None);
    }

    #[test]
    fn windowed_list_recomputes_on_scroll_and_resize() {
        let mut list = WindowedList::new((0..1000).collect::<Vec<u32>>(), 40.0, 400.0, 3);
        assert_eq!(list.window().map(|w| w.end_index), Some(13));

        assert!(list.scroll_to(4000.0));
        let rows: Vec<(usize, u32)> = list.visible().map(|(i, v)| (i, *v)).collect();
        assert_eq!(rows.first(), Some(&(97, 97)));
        assert_eq!(rows.last(), Some(&(113, 113)));

        assert!(!list.scroll_to(4000.0));

        assert!(list.resize(800.0));
        assert_eq!(list.window().map(|w| w.end_index), Some(123));
    }

    #[test]
    fn windowed_list_clamps_scroll_to_content() {
        let mut list = WindowedList::new(vec!["a"; 30], 40.0, 400.0, 2);

        list.scroll_to(1_000_000.0);

        assert_eq!(list.scroll_top(), 800.0);
        assert_eq!(list.window().map(|w| w.end_index), Some(29));

        list.set_items(vec!["a"; 5]);
        assert_eq!(list.scroll_top(), 0.0);
        assert_eq!(list.visible().count(), 5);
    }

    #[test]
    fn scroll_to_index_puts_the_row_on_top() {
        let mut list = WindowedList::new((0..100).collect::<Vec<u32>>(), 20.0, 100.0, 1);

        list.scroll_to_index(50);

        let window = list.window().unwrap();
        assert_eq!(window.start_index, 49);
        assert_eq!(list.scroll_top(), 1000.0);
    }

    #[test]
    fn empty_list_renders_nothing() {
        let list: WindowedList<u32> = WindowedList::new(Vec::new(), 40.0, 400.0, 3);

        assert_eq!(list.window(), None);
        assert_eq!(list.visible().count(), 0);
    }
}
