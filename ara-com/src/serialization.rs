//! Conversion between typed values and payload bytes.
//!
//! Provides the [`Serialize`] and [`Deserialize`] traits, and implementations for the types that
//! travel over every binding:
//!
//! - fixed-layout types (integers, floats, `bool`) are copied in their native memory
//!   representation.
//! - strings are encoded as a 32-bit native-endian length followed by the UTF-8 bytes.
//! - raw byte buffers ([`Vec<u8>`] and [`Bytes`]) are passed through unchanged.
//! - arrays and tuples concatenate the encoding of their elements.
//!
//! Deserialization fails with [`ComErrc::FieldValueIsNotValid`] whenever the buffer is shorter
//! than the minimum encoding of the type.

use crate::{ComErrc, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::mem::size_of;


/// Serialize data into a payload.
pub trait Serialize {
    /// Serializes the implementing type into the buffer.
    ///
    /// Returns the size of the serialized data.
    ///
    /// # Errors
    ///
    /// Returns [`ComErrc::FieldValueIsNotValid`] if the value cannot be represented, such as a
    /// string longer than the length field allows.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ara_com::serialization::Serialize;
    /// use bytes::BytesMut;
    /// let mut buffer = BytesMut::new();
    /// assert_eq!(7u32.serialize(&mut buffer), Ok(4));
    /// assert_eq!(&buffer[..], &7u32.to_ne_bytes()[..]);
    /// ```
    fn serialize(&self, buffer: &mut BytesMut) -> Result<usize>;

    /// Returns the expected size of the serialized data.
    fn size_hint(&self) -> usize;
}

/// Deserialize data from a payload.
pub trait Deserialize: Sized {
    /// Deserializes an instance of the implementing type from the front of the buffer.
    ///
    /// # Errors
    ///
    /// Returns [`ComErrc::FieldValueIsNotValid`] if the buffer runs out of data or contains data
    /// that is not a valid encoding of the type.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use ara_com::{serialization::Deserialize, ComErrc};
    /// use bytes::Bytes;
    /// let mut buffer = Bytes::copy_from_slice(&[1u8, 2u8]);
    /// assert_eq!(u8::deserialize(&mut buffer), Ok(1u8));
    /// assert_eq!(u8::deserialize(&mut buffer), Ok(2u8));
    /// assert_eq!(u8::deserialize(&mut buffer), Err(ComErrc::FieldValueIsNotValid));
    /// ```
    fn deserialize(buffer: &mut Bytes) -> Result<Self>;
}

/// Serializes a value into a new payload.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn serialize<T>(value: &T) -> Result<Bytes>
where
    T: Serialize + ?Sized,
{
    let mut buffer = BytesMut::with_capacity(value.size_hint());
    value.serialize(&mut buffer)?;
    Ok(buffer.freeze())
}

/// Deserializes a value from the front of a payload.
///
/// Trailing bytes are ignored.
///
/// # Errors
///
/// Returns [`ComErrc::FieldValueIsNotValid`] if the payload is not a valid encoding of `T`.
pub fn deserialize<T>(data: &[u8]) -> Result<T>
where
    T: Deserialize,
{
    let mut buffer = Bytes::copy_from_slice(data);
    T::deserialize(&mut buffer)
}

fn ensure_remaining(buffer: &Bytes, len: usize) -> Result<()> {
    if buffer.remaining() < len {
        return Err(ComErrc::FieldValueIsNotValid);
    }
    Ok(())
}

macro_rules! codec_basic_type {
    ($t:ty) => {
        impl Serialize for $t {
            fn serialize(&self, buffer: &mut BytesMut) -> Result<usize> {
                buffer.put_slice(&self.to_ne_bytes());
                Ok(size_of::<$t>())
            }

            fn size_hint(&self) -> usize {
                size_of::<$t>()
            }
        }

        impl Deserialize for $t {
            fn deserialize(buffer: &mut Bytes) -> Result<Self> {
                ensure_remaining(buffer, size_of::<Self>())?;
                let mut raw = [0u8; size_of::<$t>()];
                buffer.copy_to_slice(&mut raw);
                Ok(<$t>::from_ne_bytes(raw))
            }
        }
    };
}

codec_basic_type!(u8);
codec_basic_type!(u16);
codec_basic_type!(u32);
codec_basic_type!(u64);
codec_basic_type!(i8);
codec_basic_type!(i16);
codec_basic_type!(i32);
codec_basic_type!(i64);
codec_basic_type!(f32);
codec_basic_type!(f64);

impl Serialize for bool {
    fn serialize(&self, buffer: &mut BytesMut) -> Result<usize> {
        u8::from(*self).serialize(buffer)
    }

    fn size_hint(&self) -> usize {
        size_of::<u8>()
    }
}

impl Deserialize for bool {
    fn deserialize(buffer: &mut Bytes) -> Result<Self> {
        Ok(u8::deserialize(buffer)? != 0)
    }
}

impl Serialize for () {
    fn serialize(&self, _buffer: &mut BytesMut) -> Result<usize> {
        Ok(0)
    }

    fn size_hint(&self) -> usize {
        0
    }
}

impl Deserialize for () {
    fn deserialize(_buffer: &mut Bytes) -> Result<Self> {
        Ok(())
    }
}

impl<T> Serialize for &T
where
    T: Serialize + ?Sized,
{
    fn serialize(&self, buffer: &mut BytesMut) -> Result<usize> {
        (**self).serialize(buffer)
    }

    fn size_hint(&self) -> usize {
        (**self).size_hint()
    }
}

impl Serialize for str {
    fn serialize(&self, buffer: &mut BytesMut) -> Result<usize> {
        let len = u32::try_from(self.len()).map_err(|_| ComErrc::FieldValueIsNotValid)?;
        let mut size = len.serialize(buffer)?;
        buffer.put_slice(self.as_bytes());
        size += self.len();
        Ok(size)
    }

    fn size_hint(&self) -> usize {
        size_of::<u32>() + self.len()
    }
}

impl Serialize for String {
    fn serialize(&self, buffer: &mut BytesMut) -> Result<usize> {
        self.as_str().serialize(buffer)
    }

    fn size_hint(&self) -> usize {
        self.as_str().size_hint()
    }
}

impl Deserialize for String {
    fn deserialize(buffer: &mut Bytes) -> Result<Self> {
        let len = usize::try_from(u32::deserialize(buffer)?)
            .map_err(|_| ComErrc::FieldValueIsNotValid)?;
        ensure_remaining(buffer, len)?;
        let raw = buffer.split_to(len);
        Self::from_utf8(raw.to_vec()).map_err(|_| ComErrc::FieldValueIsNotValid)
    }
}

impl Serialize for [u8] {
    fn serialize(&self, buffer: &mut BytesMut) -> Result<usize> {
        buffer.put_slice(self);
        Ok(self.len())
    }

    fn size_hint(&self) -> usize {
        self.len()
    }
}

impl Serialize for Vec<u8> {
    fn serialize(&self, buffer: &mut BytesMut) -> Result<usize> {
        self.as_slice().serialize(buffer)
    }

    fn size_hint(&self) -> usize {
        self.len()
    }
}

impl Deserialize for Vec<u8> {
    fn deserialize(buffer: &mut Bytes) -> Result<Self> {
        Ok(buffer.split_to(buffer.remaining()).to_vec())
    }
}

impl Serialize for Bytes {
    fn serialize(&self, buffer: &mut BytesMut) -> Result<usize> {
        buffer.put_slice(self);
        Ok(self.len())
    }

    fn size_hint(&self) -> usize {
        self.len()
    }
}

impl Deserialize for Bytes {
    fn deserialize(buffer: &mut Bytes) -> Result<Self> {
        Ok(buffer.split_to(buffer.remaining()))
    }
}

impl<T, const N: usize> Serialize for [T; N]
where
    T: Serialize,
{
    fn serialize(&self, buffer: &mut BytesMut) -> Result<usize> {
        let mut total = 0;
        for element in self {
            total += element.serialize(buffer)?;
        }
        Ok(total)
    }

    fn size_hint(&self) -> usize {
        self.iter().map(Serialize::size_hint).sum()
    }
}

impl<T, const N: usize> Deserialize for [T; N]
where
    T: Deserialize,
{
    fn deserialize(buffer: &mut Bytes) -> Result<Self> {
        let elements = (0..N)
            .map(|_| T::deserialize(buffer))
            .collect::<Result<Vec<T>>>()?;
        elements
            .try_into()
            .map_err(|_| ComErrc::FieldValueIsNotValid)
    }
}

macro_rules! codec_tuple {
    ( $( $name:ident )+ ) => {
        impl<$($name: Serialize),+> Serialize for ($($name,)+) {
            #[allow(non_snake_case)]
            fn serialize(&self, buffer: &mut BytesMut) -> Result<usize> {
                let ($($name,)+) = self;
                let mut total = 0;
                $(total += $name.serialize(buffer)?;)+
                Ok(total)
            }

            #[allow(non_snake_case)]
            fn size_hint(&self) -> usize {
                let ($($name,)+) = self;
                let mut total = 0;
                $(total += $name.size_hint();)+
                total
            }
        }

        impl<$($name: Deserialize),+> Deserialize for ($($name,)+) {
            fn deserialize(buffer: &mut Bytes) -> Result<Self> {
                Ok((
                    $($name::deserialize(buffer)?,)+
                ))
            }
        }
    };
}

codec_tuple! { A }
codec_tuple! { A B }
codec_tuple! { A B C }
codec_tuple! { A B C D }
codec_tuple! { A B C D E }
codec_tuple! { A B C D E F }
codec_tuple! { A B C D E F G }
codec_tuple! { A B C D E F G H }
codec_tuple! { A B C D E F G H I }
codec_tuple! { A B C D E F G H I J }
codec_tuple! { A B C D E F G H I J K }
codec_tuple! { A B C D E F G H I J K L }
