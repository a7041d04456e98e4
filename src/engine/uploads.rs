use std::collections::VecDeque;

/// Hard cap on concurrently outstanding chunk work: one slot for the
/// chunk currently uploading, one for the chunk being processed remotely.
pub const MAX_CONCURRENT_UPLOADS: usize = 2;

/// A pending attempt to transfer one chunk's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadTask {
    pub chunk_index: u32,
}

/// Ordered queue of pending chunk uploads with a hard cap on in-flight
/// work.
///
/// Sole owner of the in-flight counter: no other component may start
/// work or change the count. Waiting tasks are scheduled FIFO; a task
/// that fails and is manually retried re-enters at the back, not its
/// original position.
#[derive(Debug)]
pub struct UploadQueue {
    waiting: VecDeque<UploadTask>,
    in_flight: usize,
    max_concurrent: usize,
}

impl UploadQueue {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            waiting: VecDeque::new(),
            in_flight: 0,
            max_concurrent,
        }
    }

    /// Append a task at the back of the queue.
    pub fn submit(&mut self, task: UploadTask) {
        self.waiting.push_back(task);
    }

    /// Advance the next waiting task to in-flight, if capacity allows.
    pub fn next_ready(&mut self) -> Option<UploadTask> {
        if self.in_flight >= self.max_concurrent {
            return None;
        }
        let task = self.waiting.pop_front()?;
        self.in_flight += 1;
        Some(task)
    }

    /// One outstanding task finished (success or failure); frees a slot.
    pub fn complete_one(&mut self) {
        debug_assert!(self.in_flight > 0, "slot released with none held");
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn waiting(&self) -> usize {
        self.waiting.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(index: u32) -> UploadTask {
        UploadTask { chunk_index: index }
    }

    #[test]
    fn schedules_fifo_up_to_the_cap() {
        let mut queue = UploadQueue::new(2);
        queue.submit(task(0));
        queue.submit(task(1));
        queue.submit(task(2));

        assert_eq!(queue.next_ready(), Some(task(0)));
        assert_eq!(queue.next_ready(), Some(task(1)));
        assert_eq!(queue.next_ready(), None, "cap reached");
        assert_eq!(queue.in_flight(), 2);
        assert_eq!(queue.waiting(), 1);
    }

    #[test]
    fn completing_a_task_frees_one_slot() {
        let mut queue = UploadQueue::new(2);
        for i in 0..3 {
            queue.submit(task(i));
        }
        queue.next_ready();
        queue.next_ready();

        queue.complete_one();
        assert_eq!(queue.next_ready(), Some(task(2)));
        assert_eq!(queue.next_ready(), None);
    }

    #[test]
    fn resubmission_goes_to_the_back() {
        let mut queue = UploadQueue::new(1);
        queue.submit(task(0));
        queue.submit(task(1));
        assert_eq!(queue.next_ready(), Some(task(0)));
        queue.complete_one();

        // task 0 failed and is retried; it queues behind task 1
        queue.submit(task(0));
        assert_eq!(queue.next_ready(), Some(task(1)));
        queue.complete_one();
        assert_eq!(queue.next_ready(), Some(task(0)));
    }
}
