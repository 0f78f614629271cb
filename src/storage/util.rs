use std::time::Duration;

#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Number of points that triggers an immediate batch send
    pub batch_size: usize,
    /// Maximum time a non-empty batch waits before it is sent
    pub flush_interval: Duration,
    /// Capacity of the point queue feeding the batcher
    pub queue_capacity: usize,
    /// Capacity of the error feedback channel
    pub error_capacity: usize,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            batch_size: 512,
            flush_interval: Duration::from_millis(1000),
            queue_capacity: 4096,
            error_capacity: 64,
        }
    }
}

impl WriteOptions {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_flush_interval(mut self, flush_interval: Duration) -> Self {
        self.flush_interval = flush_interval;
        self
    }
}

/// Accumulates line protocol for one pending batch.
#[derive(Debug, Default)]
pub struct LineBatch {
    body: String,
    points: usize,
}

impl LineBatch {
    pub fn push(&mut self, line: &str) {
        if !self.body.is_empty() {
            self.body.push('\n');
        }
        self.body.push_str(line);
        self.points += 1;
    }

    pub fn len(&self) -> usize {
        self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points == 0
    }

    /// Take the accumulated body, leaving the batch empty.
    pub fn take(&mut self) -> (String, usize) {
        let points = std::mem::take(&mut self.points);
        (std::mem::take(&mut self.body), points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_batch_joins_with_newlines() {
        let mut batch = LineBatch::default();
        batch.push("a x=1u 1");
        batch.push("b x=2u 2");
        assert_eq!(batch.len(), 2);

        let (body, points) = batch.take();
        assert_eq!(body, "a x=1u 1\nb x=2u 2");
        assert_eq!(points, 2);
        assert!(batch.is_empty());
    }
}
