use std::collections::VecDeque;

use chrono::{DateTime, Local};

/// Fixed-capacity FIFO buffer. Once filled it always holds `capacity` items.
#[derive(Debug, Clone)]
pub struct RollingWindow<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> RollingWindow<T> {
    /// A window pre-populated with `capacity` copies of `placeholder`.
    pub fn filled(capacity: usize, placeholder: T) -> Self {
        let mut items = VecDeque::with_capacity(capacity + 1);
        items.extend(std::iter::repeat(placeholder).take(capacity));
        Self { items, capacity }
    }
}

impl<T> RollingWindow<T> {
    /// Append at the back and evict the front. Returns the evicted item.
    pub fn push(&mut self, item: T) -> Option<T> {
        self.items.push_back(item);
        if self.items.len() > self.capacity {
            self.items.pop_front()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }
}

pub type Point = (DateTime<Local>, f64);

type RedrawHook = Box<dyn FnMut(&RollingWindow<Point>) + Send>;

/// A live line chart fed one point at a time.
///
/// Every append redraws synchronously. The redraw is a single hook: the
/// generation counter lets the terminal UI notice the change, and an optional
/// callback can batch or forward it elsewhere.
pub struct ChartAdapter {
    title: String,
    window: RollingWindow<Point>,
    generation: u64,
    on_redraw: Option<RedrawHook>,
}

impl ChartAdapter {
    pub fn new(title: impl Into<String>, capacity: usize) -> Self {
        Self {
            title: title.into(),
            window: RollingWindow::filled(capacity, (Local::now(), 0.0)),
            generation: 0,
            on_redraw: None,
        }
    }

    pub fn with_redraw(mut self, hook: impl FnMut(&RollingWindow<Point>) + Send + 'static) -> Self {
        self.on_redraw = Some(Box::new(hook));
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn append_metric(&mut self, value: f64) {
        self.append_point((Local::now(), value));
    }

    pub fn append_point(&mut self, point: Point) {
        self.window.push(point);
        self.redraw();
    }

    fn redraw(&mut self) {
        self.generation += 1;
        if let Some(hook) = self.on_redraw.as_mut() {
            hook(&self.window);
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn window(&self) -> &RollingWindow<Point> {
        &self.window
    }

    pub fn values(&self) -> impl DoubleEndedIterator<Item = f64> + ExactSizeIterator + '_ {
        self.window.iter().map(|(_, v)| *v)
    }

    pub fn latest(&self) -> f64 {
        self.window.last().map(|(_, v)| *v).unwrap_or(0.0)
    }

    pub fn max_value(&self) -> f64 {
        self.values().fold(0.0, f64::max)
    }
}
