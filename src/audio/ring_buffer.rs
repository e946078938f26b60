//! Lock-free SPSC ring buffer for capture samples.
//!
//! Uses the `ringbuf` crate to pass 16-bit PCM samples from the cpal
//! callback thread to the chunk forwarder without locks.

use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapRb,
};

/// Default capacity: ~10 seconds of 16 kHz mono audio.
const DEFAULT_CAPACITY: usize = 160_000;

/// Producer half — lives in the cpal audio callback.
pub struct SampleProducer {
    inner: ringbuf::HeapProd<i16>,
}

/// Consumer half — lives in the capture control thread.
pub struct SampleConsumer {
    inner: ringbuf::HeapCons<i16>,
}

/// Create a matched producer/consumer pair.
pub fn sample_ring_buffer(capacity: Option<usize>) -> (SampleProducer, SampleConsumer) {
    let cap = capacity.unwrap_or(DEFAULT_CAPACITY);
    let rb = HeapRb::<i16>::new(cap);
    let (prod, cons) = rb.split();
    (SampleProducer { inner: prod }, SampleConsumer { inner: cons })
}

impl SampleProducer {
    /// Push a slice of samples. Returns how many were written; a full
    /// buffer drops the tail and the consumer catches up.
    pub fn push_slice(&mut self, samples: &[i16]) -> usize {
        self.inner.push_slice(samples)
    }
}

// Safety: the producer is only ever used from the cpal callback thread.
unsafe impl Send for SampleProducer {}

impl SampleConsumer {
    /// Pop up to `buf.len()` samples. Returns how many were read.
    pub fn pop_slice(&mut self, buf: &mut [i16]) -> usize {
        self.inner.pop_slice(buf)
    }

    /// Samples currently available for reading.
    pub fn available(&self) -> usize {
        self.inner.occupied_len()
    }

    /// Discard everything buffered.
    pub fn clear(&mut self) {
        let n = self.available();
        if n == 0 {
            return;
        }
        let mut scratch = vec![0i16; n];
        self.pop_slice(&mut scratch);
    }
}

// Safety: the consumer is only ever used from the capture control thread.
unsafe impl Send for SampleConsumer {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_roundtrip() {
        let (mut prod, mut cons) = sample_ring_buffer(Some(8));
        assert_eq!(prod.push_slice(&[1, 2, 3]), 3);
        let mut out = [0i16; 3];
        assert_eq!(cons.pop_slice(&mut out), 3);
        assert_eq!(out, [1, 2, 3]);
    }

    #[test]
    fn test_full_buffer_drops_tail() {
        let (mut prod, mut cons) = sample_ring_buffer(Some(4));
        assert_eq!(prod.push_slice(&[1, 2, 3, 4, 5, 6]), 4);
        assert_eq!(cons.available(), 4);
        cons.clear();
        assert_eq!(cons.available(), 0);
    }
}
