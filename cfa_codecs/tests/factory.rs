//! Header dispatch: `construct_from_stream` must pick the array type the
//! header describes, decline what no bundled type can hold, and surface only
//! fatal errors.
use cfa_codecs::{construct_from_stream, Array1d, Array1f, Array2d, Array2f, Array3d, Array3f};
use cfa_core::bitstream::BitStream;
use cfa_core::buffer::AlignedBuf;
use cfa_core::format::{self, FieldDescriptor, HEADER_SIZE};
use cfa_core::{ArrayError, CompressedArray, Header, RateParams, ScalarType};

fn handcrafted_header(field: FieldDescriptor, params: RateParams) -> Header {
    let mut bits = BitStream::new(AlignedBuf::zeroed(HEADER_SIZE).unwrap());
    format::write_header(&mut bits, &field, &params).unwrap();
    bits.flush();
    Header::from_slice(bits.buffer()).unwrap()
}

/// Serialize `array`, rebuild it through the factory and check the result
/// has the same concrete type and bytes.
fn rebuild<A: CompressedArray + 'static>(array: &A) -> anyhow::Result<()> {
    let header = array.write_header()?;
    let data = array.compressed_data().to_vec();
    let rebuilt = construct_from_stream(&header, &data)?.expect("header accepted");
    assert!(rebuilt.as_any().is::<A>());
    assert_eq!(rebuilt.dimensionality(), array.dimensionality());
    assert_eq!(rebuilt.scalar_type(), array.scalar_type());
    assert_eq!(rebuilt.checksum(), array.checksum());
    Ok(())
}

#[test]
fn test_every_bundled_type_round_trips() -> anyhow::Result<()> {
    let values: Vec<f64> = (0..12 * 7 * 5).map(|i| (i as f64 * 0.01).cos()).collect();
    let floats: Vec<f32> = values.iter().map(|&v| v as f32).collect();

    rebuild(&Array1f::new(84, 16.0, Some(&floats[..84]), 0)?)?;
    rebuild(&Array1d::new(84, 16.0, Some(&values[..84]), 0)?)?;
    rebuild(&Array2f::new(12, 7, 8.0, Some(&floats[..84]), 0)?)?;
    rebuild(&Array2d::new(12, 7, 8.0, Some(&values[..84]), 0)?)?;
    rebuild(&Array3f::new(12, 7, 5, 4.0, Some(&floats), 0)?)?;
    rebuild(&Array3d::new(12, 7, 5, 4.0, Some(&values), 0)?)?;
    Ok(())
}

#[test]
fn test_header_without_buffer_gives_zeroed_array() -> anyhow::Result<()> {
    let header = Array2d::new(9, 9, 8.0, None, 0)?.write_header()?;
    let array = construct_from_stream(&header, &[])?.expect("header accepted");
    let plane = array.as_any().downcast_ref::<Array2d>().expect("2D double array");
    assert_eq!((plane.size_x(), plane.size_y()), (9, 9));
    assert_eq!(plane.get(8, 8), 0.0);
    Ok(())
}

#[test]
fn test_garbage_is_not_a_header() {
    let header = Header {
        buffer: [0xdead_beef, 0x0123_4567, 0x89ab_cdef],
    };
    assert!(construct_from_stream(&header, &[]).unwrap().is_none());
    assert!(construct_from_stream(&Header::default(), &[1, 2, 3]).unwrap().is_none());
}

#[test]
fn test_integer_arrays_are_declined() {
    let field = FieldDescriptor {
        scalar_type: ScalarType::Int32,
        nx: 16,
        ny: 0,
        nz: 0,
    };
    let (params, _) = RateParams::fixed_rate(8.0, ScalarType::Int32, 1, true);
    let header = handcrafted_header(field, params);
    assert!(construct_from_stream(&header, &[]).unwrap().is_none());
}

#[test]
fn test_non_fixed_rate_modes_are_declined() {
    let field = FieldDescriptor {
        scalar_type: ScalarType::Double,
        nx: 16,
        ny: 16,
        nz: 0,
    };
    let precision = RateParams {
        maxprec: 24,
        ..RateParams::default()
    };
    let header = handcrafted_header(field, precision);
    assert!(construct_from_stream(&header, &[]).unwrap().is_none());
}

#[test]
fn test_short_buffer_is_fatal() {
    let array = Array3f::new(8, 8, 8, 8.0, None, 0).unwrap();
    let header = array.write_header().unwrap();
    let data = array.compressed_data().to_vec();

    let Err(err) = construct_from_stream(&header, &data[..16]) else {
        panic!("short buffer accepted");
    };
    assert!(err.is_fatal());
    assert!(matches!(err, ArrayError::BufferTooSmall { actual: 16, .. }), "{err}");
}
