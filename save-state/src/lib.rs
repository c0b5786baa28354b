//! Flat little-endian snapshots of emulator state
//!
//! A snapshot is the concatenation of every field in declaration order,
//! without any framing. Readers must therefore deserialize into a value of
//! exactly the same shape that produced the bytes.

#[cfg(test)]
mod tests;

pub struct SaveStateSerializer {
    pub data: Vec<u8>,
}

impl SaveStateSerializer {
    pub const fn new() -> Self {
        Self { data: Vec::new() }
    }
}

impl Default for SaveStateSerializer {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SaveStateDeserializer<'a> {
    pub data: core::slice::Iter<'a, u8>,
}

impl<'a> SaveStateDeserializer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data: data.iter() }
    }

    pub fn remaining(&self) -> usize {
        self.data.as_slice().len()
    }

    /// Split off the next `n` bytes
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], OutOfData> {
        let rest = self.data.as_slice();
        if rest.len() < n {
            return Err(OutOfData {
                needed: n,
                remaining: rest.len(),
            });
        }
        let (head, tail) = rest.split_at(n);
        self.data = tail.iter();
        Ok(head)
    }
}

/// The snapshot ended before the value was completely read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfData {
    pub needed: usize,
    pub remaining: usize,
}

impl std::fmt::Display for OutOfData {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            fmt,
            "snapshot truncated: needed {} bytes, {} remaining",
            self.needed, self.remaining
        )
    }
}

impl std::error::Error for OutOfData {}

pub trait InSaveState: Sized {
    fn serialize(&self, state: &mut SaveStateSerializer);
    fn deserialize(&mut self, state: &mut SaveStateDeserializer) -> Result<(), OutOfData>;
}

macro_rules! impl_for_le_bytes {
    ($t:ty) => {
        impl InSaveState for $t {
            fn serialize(&self, state: &mut SaveStateSerializer) {
                state.data.extend_from_slice(&self.to_le_bytes())
            }

            fn deserialize(&mut self, state: &mut SaveStateDeserializer) -> Result<(), OutOfData> {
                let bytes = state.take(core::mem::size_of::<$t>())?;
                let mut arr = [0u8; core::mem::size_of::<$t>()];
                arr.copy_from_slice(bytes);
                *self = <$t>::from_le_bytes(arr);
                Ok(())
            }
        }
    };
    () => {};
    ($t1:ty $(,$t:ty)*) => { impl_for_le_bytes!($t1); impl_for_le_bytes!($($t),*); };
}

impl_for_le_bytes! { u8, u16, u32, u64, i8, i16, i32, i64, f32, f64 }

// usize is always stored as 64 bits so snapshots move between hosts
impl InSaveState for usize {
    fn serialize(&self, state: &mut SaveStateSerializer) {
        (*self as u64).serialize(state)
    }

    fn deserialize(&mut self, state: &mut SaveStateDeserializer) -> Result<(), OutOfData> {
        let mut i: u64 = 0;
        i.deserialize(state)?;
        *self = i as usize;
        Ok(())
    }
}

// This uses 0 and 255 for false and true. That will make the memory
// representation more robust against memory corruption by random
// bit flips.
impl InSaveState for bool {
    fn serialize(&self, state: &mut SaveStateSerializer) {
        let i: u8 = if *self { 0xff } else { 0 };
        i.serialize(state)
    }

    fn deserialize(&mut self, state: &mut SaveStateDeserializer) -> Result<(), OutOfData> {
        let mut i: u8 = 0;
        i.deserialize(state)?;
        *self = i.count_ones() >= 4;
        Ok(())
    }
}

impl<const N: usize, T: InSaveState> InSaveState for [T; N] {
    fn serialize(&self, state: &mut SaveStateSerializer) {
        self.iter().for_each(|i| i.serialize(state))
    }

    fn deserialize(&mut self, state: &mut SaveStateDeserializer) -> Result<(), OutOfData> {
        self.iter_mut().try_for_each(|i| i.deserialize(state))
    }
}

/// Vectors carry their length; a stored length that differs from the
/// target's is accepted and resizes the target.
impl<T: InSaveState + Default + Clone> InSaveState for Vec<T> {
    fn serialize(&self, state: &mut SaveStateSerializer) {
        self.len().serialize(state);
        self.iter().for_each(|i| i.serialize(state))
    }

    fn deserialize(&mut self, state: &mut SaveStateDeserializer) -> Result<(), OutOfData> {
        let mut n: usize = 0;
        n.deserialize(state)?;
        // refuse absurd lengths before allocating
        if n > state.remaining() {
            return Err(OutOfData {
                needed: n,
                remaining: state.remaining(),
            });
        }
        self.resize(n, T::default());
        self.iter_mut().try_for_each(|i| i.deserialize(state))
    }
}
