use super::*;

macro_rules! test_serialize_int {
    ($t:ty, $iter:expr) => {{
        let mut s = SaveStateSerializer::new();
        for i in $iter {
            i.serialize(&mut s);
            assert_eq!(s.data.as_slice(), i.to_le_bytes().as_slice());
            let mut d = SaveStateDeserializer::new(&s.data);
            let mut v: $t = 0;
            v.deserialize(&mut d).unwrap();
            assert_eq!(i, v);
            assert_eq!(d.remaining(), 0);
            s.data.clear();
        }
    }};
}

#[test]
pub fn test_serialize_u8() {
    test_serialize_int!(u8, 0..=0xffu8)
}

#[test]
pub fn test_serialize_i16() {
    test_serialize_int!(i16, -0x8000..=0x7fffi16)
}

#[test]
pub fn test_serialize_i32() {
    // every 24-bit sample value plus the extremes outside of it
    test_serialize_int!(
        i32,
        (-0x80_0000..0x80_0000)
            .step_by(0x101)
            .chain([i32::MIN, i32::MAX])
    )
}

#[test]
pub fn test_serialize_u64() {
    test_serialize_int!(
        u64,
        (0..=0x1111u64).map(|i| ((i * 170) + (i ^ 0x25e123)) * 0x4127)
    )
}

#[test]
pub fn test_serialize_f64() {
    let mut s = SaveStateSerializer::new();
    for v in [0.0f64, -0.0, 1.0, -1.5, core::f64::consts::PI, f64::MAX] {
        v.serialize(&mut s);
        let mut d = SaveStateDeserializer::new(&s.data);
        let mut r = 0.0f64;
        r.deserialize(&mut d).unwrap();
        assert_eq!(v.to_bits(), r.to_bits());
        s.data.clear();
    }
}

#[test]
pub fn test_serialize_bool_tolerates_bit_flips() {
    let mut b = false;
    b.deserialize(&mut SaveStateDeserializer::new(&[0xfe])).unwrap();
    assert!(b);
    b.deserialize(&mut SaveStateDeserializer::new(&[0x01])).unwrap();
    assert!(!b);
}

#[test]
pub fn test_serialize_vec_resizes_target() {
    let src: Vec<i32> = (0..1000).map(|i| i * -3).collect();
    let mut s = SaveStateSerializer::new();
    src.serialize(&mut s);
    let mut dst = vec![7i32; 3];
    dst.deserialize(&mut SaveStateDeserializer::new(&s.data))
        .unwrap();
    assert_eq!(src, dst);
}

#[test]
pub fn test_truncated_snapshot_is_an_error() {
    let mut s = SaveStateSerializer::new();
    [1u32, 2, 3].serialize(&mut s);
    s.data.pop();
    let mut arr = [0u32; 3];
    let err = arr
        .deserialize(&mut SaveStateDeserializer::new(&s.data))
        .unwrap_err();
    assert_eq!(
        err,
        OutOfData {
            needed: 4,
            remaining: 3
        }
    );
}
