/// Returned by [`Ring::push`] when there is no free slot, handing the element back to the caller.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Full<T>(pub T);

/// A fixed-capacity FIFO ring.
///
/// `head` is the next slot to write and `tail` the next slot to read. Both run modulo `2 * SIZE`
/// so that `head == tail` means empty while all `SIZE` slots can still be filled. The producer
/// only moves `head` and the consumer only moves `tail`.
pub struct Ring<T, const SIZE: usize> {
    slots: [T; SIZE],
    head: usize,
    tail: usize,
}

impl<const SIZE: usize> Ring<u8, SIZE> {
    pub const fn new() -> Self {
        Self {
            slots: [0; SIZE],
            head: 0,
            tail: 0,
        }
    }
}

impl<T: Copy + Default, const SIZE: usize> Default for Ring<T, SIZE> {
    fn default() -> Self {
        Self {
            slots: [T::default(); SIZE],
            head: 0,
            tail: 0,
        }
    }
}

impl<T: Copy, const SIZE: usize> Ring<T, SIZE> {
    fn advance(index: usize) -> usize {
        (index + 1) % (2 * SIZE)
    }

    pub fn capacity(&self) -> usize {
        SIZE
    }

    pub fn len(&self) -> usize {
        (self.head + 2 * SIZE - self.tail) % (2 * SIZE)
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    pub fn is_full(&self) -> bool {
        self.len() == SIZE
    }

    /// Add an element at the head. Fails without changing anything if the ring is full.
    pub fn push(&mut self, element: T) -> Result<(), Full<T>> {
        if self.is_full() {
            return Err(Full(element));
        }
        self.slots[self.head % SIZE] = element;
        self.head = Self::advance(self.head);
        Ok(())
    }

    /// Add as many elements as possible from the given slice. Returns the number added.
    pub fn push_all(&mut self, elements: &[T]) -> usize {
        let mut added = 0;
        for &element in elements {
            if self.push(element).is_err() {
                break;
            }
            added += 1;
        }
        added
    }

    /// The oldest element, without removing it.
    pub fn peek(&self) -> Option<&T> {
        if self.is_empty() {
            None
        } else {
            Some(&self.slots[self.tail % SIZE])
        }
    }

    /// Remove and return the oldest element.
    pub fn pop(&mut self) -> Option<T> {
        let element = *self.peek()?;
        self.tail = Self::advance(self.tail);
        Some(element)
    }

    /// Drop every element. Slots are overwritten lazily by later pushes.
    pub fn clear(&mut self) {
        self.tail = self.head;
    }
}
