/// Fixed-capacity ring of batches, one batch per future timestep.
///
/// The slot at `current_pos` holds everything due in the current step. A value
/// scheduled with offset `d` becomes due `d` calls to `advance` later. Batches
/// keep their allocation after being drained, so a warmed-up buffer does not
/// allocate on the hot path.
#[derive(Debug)]
pub struct BatchedRingBuffer<T> {
    batch_buffers: Vec<Vec<T>>,
    current_pos: usize,
}

impl<T: Clone> BatchedRingBuffer<T> {
    /// Buffer able to hold values scheduled up to `max_offset` steps ahead.
    pub fn with_max_offset(max_offset: usize) -> BatchedRingBuffer<T> {
        BatchedRingBuffer {
            batch_buffers: vec![Vec::new(); max_offset + 1],
            current_pos: 0,
        }
    }

    pub fn max_offset(&self) -> usize {
        self.batch_buffers.len() - 1
    }

    pub fn push_at_offset(&mut self, offset: usize, value: T) {
        debug_assert!(offset >= 1 && offset <= self.max_offset());

        let target_pos = self.get_target_pos(offset);
        self.batch_buffers[target_pos].push(value);
    }

    fn get_target_pos(&self, offset: usize) -> usize {
        let mut target_pos = self.current_pos + offset;

        if target_pos >= self.batch_buffers.len() {
            target_pos -= self.batch_buffers.len();
        }

        target_pos
    }

    pub fn due_batch_size(&self) -> usize {
        self.batch_buffers[self.current_pos].len()
    }

    pub fn drain_due(&mut self) -> impl Iterator<Item = T> + '_ {
        self.batch_buffers[self.current_pos].drain(..)
    }

    pub fn advance(&mut self) {
        debug_assert!(self.batch_buffers[self.current_pos].is_empty());

        self.current_pos += 1;
        if self.current_pos == self.batch_buffers.len() {
            self.current_pos = 0;
        }
    }

    pub fn pending_count(&self) -> usize {
        self.batch_buffers.iter().map(Vec::len).sum()
    }

    pub fn clear(&mut self) {
        for batch in &mut self.batch_buffers {
            batch.clear();
        }
    }
}

#[cfg(test)]
mod tests {

    use super::BatchedRingBuffer;
    use itertools::assert_equal;
    use rand::{distributions::Uniform, prelude::Distribution, rngs::StdRng, SeedableRng};

    const EMPTY: [i32; 0] = [];

    fn drain_and_advance(sut: &mut BatchedRingBuffer<i32>) -> Vec<i32> {
        let batch = sut.drain_due().collect();
        sut.advance();
        batch
    }

    #[test]
    fn empty() {
        let mut sut: BatchedRingBuffer<i32> = BatchedRingBuffer::with_max_offset(8);
        assert_eq!(sut.max_offset(), 8);
        assert_equal(drain_and_advance(&mut sut), EMPTY);
    }

    #[test]
    fn delivered_exactly_at_offset() {
        let mut sut: BatchedRingBuffer<i32> = BatchedRingBuffer::with_max_offset(3);
        sut.push_at_offset(3, 11);
        assert_eq!(sut.due_batch_size(), 0);

        for _ in 0..3 {
            assert_equal(drain_and_advance(&mut sut), EMPTY);
        }

        assert_eq!(sut.due_batch_size(), 1);
        assert_equal(drain_and_advance(&mut sut), [11]);

        for _ in 0..8 {
            assert_equal(drain_and_advance(&mut sut), EMPTY);
        }
    }

    #[test]
    fn wraps_around() {
        let mut sut: BatchedRingBuffer<i32> = BatchedRingBuffer::with_max_offset(4);

        for _ in 0..3 {
            drain_and_advance(&mut sut);
        }

        sut.push_at_offset(4, 2);
        sut.push_at_offset(1, 1);
        assert_eq!(sut.pending_count(), 2);

        assert_equal(drain_and_advance(&mut sut), EMPTY);
        assert_equal(drain_and_advance(&mut sut), [1]);
        assert_equal(drain_and_advance(&mut sut), EMPTY);
        assert_equal(drain_and_advance(&mut sut), EMPTY);
        assert_equal(drain_and_advance(&mut sut), [2]);
        assert_eq!(sut.pending_count(), 0);
    }

    #[test]
    fn keeps_insertion_order_within_batch() {
        let mut sut: BatchedRingBuffer<i32> = BatchedRingBuffer::with_max_offset(2);
        sut.push_at_offset(2, 5);
        sut.push_at_offset(2, 3);
        sut.push_at_offset(2, 4);
        drain_and_advance(&mut sut);
        drain_and_advance(&mut sut);
        assert_equal(drain_and_advance(&mut sut), [5, 3, 4]);
    }

    #[test]
    fn clear() {
        let mut sut: BatchedRingBuffer<i32> = BatchedRingBuffer::with_max_offset(2);
        sut.push_at_offset(1, 5);
        sut.push_at_offset(2, 6);
        sut.clear();
        assert_eq!(sut.pending_count(), 0);
        assert_equal(drain_and_advance(&mut sut), EMPTY);
        assert_equal(drain_and_advance(&mut sut), EMPTY);
    }

    #[test]
    fn randomized_input() {
        let mut sut: BatchedRingBuffer<i32> = BatchedRingBuffer::with_max_offset(9);
        const NUM_TIME_SLOTS: usize = 101;
        let mut flat_expected_data = vec![Vec::<i32>::new(); NUM_TIME_SLOTS];
        let mut rng = StdRng::seed_from_u64(0);
        let amount_dist = Uniform::from(0..10);
        let offset_dist = Uniform::from(1..10);
        let value_dist = Uniform::from(-1000..1000);

        for flat_loc in 0..NUM_TIME_SLOTS {
            assert_eq!(sut.due_batch_size(), flat_expected_data[flat_loc].len());
            assert!(sut.drain_due().eq(flat_expected_data[flat_loc].drain(..)));

            let amount = amount_dist.sample(&mut rng);

            for _ in 0..amount {
                let offset = offset_dist.sample(&mut rng);
                let value = value_dist.sample(&mut rng);
                sut.push_at_offset(offset, value);
                let target_loc_flat_data = flat_loc + offset;
                if target_loc_flat_data < NUM_TIME_SLOTS {
                    flat_expected_data[target_loc_flat_data].push(value);
                }
            }

            sut.advance();
        }
    }
}
