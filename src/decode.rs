//! Decoding of uploaded NumPy `.npy` files into a [`NumericArray`].

use ndarray::{ArrayD, ShapeBuilder};
use npyz::{DType, NpyFile, Order};

use crate::error::{AnalysisError, AnalysisResult};
use crate::models::NumericArray;

/// Parse `.npy` bytes into an `f32` array of the stored shape.
pub fn decode_npy(bytes: &[u8]) -> AnalysisResult<NumericArray> {
    let npy = NpyFile::new(bytes).map_err(decode_error)?;
    let shape = npy.shape().to_vec();
    let order = npy.order();
    check_element_count(&shape)?;

    let type_str = match npy.dtype() {
        DType::Plain(ty) => ty.to_string(),
        other => {
            return Err(AnalysisError::Decode(format!(
                "unsupported dtype {}: expected a plain numeric array",
                other.descr()
            )))
        }
    };

    // Drop the byte-order mark, npyz handles both endiannesses.
    let code = type_str.trim_start_matches(['<', '>', '|', '=']);
    let data: Vec<f32> = match code {
        "f4" => npy.into_vec::<f32>().map_err(decode_error)?,
        "f8" => convert(npy.into_vec::<f64>().map_err(decode_error)?, |v| v as f32),
        "i1" => convert(npy.into_vec::<i8>().map_err(decode_error)?, f32::from),
        "i2" => convert(npy.into_vec::<i16>().map_err(decode_error)?, f32::from),
        "i4" => convert(npy.into_vec::<i32>().map_err(decode_error)?, |v| v as f32),
        "i8" => convert(npy.into_vec::<i64>().map_err(decode_error)?, |v| v as f32),
        "u1" => convert(npy.into_vec::<u8>().map_err(decode_error)?, f32::from),
        "u2" => convert(npy.into_vec::<u16>().map_err(decode_error)?, f32::from),
        "u4" => convert(npy.into_vec::<u32>().map_err(decode_error)?, |v| v as f32),
        "u8" => convert(npy.into_vec::<u64>().map_err(decode_error)?, |v| v as f32),
        _ => {
            return Err(AnalysisError::Decode(format!(
                "unsupported dtype {}: expected an integer or float array",
                type_str
            )))
        }
    };

    to_array_d(data, shape, order)
}

/// Widest supported element, in bytes.
const MAX_ITEM_SIZE: u64 = 8;

/// The header's shape must describe a byte length that fits in memory arithmetic.
fn check_element_count(shape: &[u64]) -> AnalysisResult<()> {
    shape
        .iter()
        .try_fold(1u64, |count, &dim| count.checked_mul(dim))
        .and_then(|count| count.checked_mul(MAX_ITEM_SIZE))
        .and_then(|bytes| usize::try_from(bytes).ok())
        .map(|_| ())
        .ok_or_else(|| AnalysisError::Decode("array shape overflows".to_string()))
}

fn convert<T: Copy>(values: Vec<T>, f: impl Fn(T) -> f32) -> Vec<f32> {
    values.into_iter().map(f).collect()
}

fn to_array_d(data: Vec<f32>, shape: Vec<u64>, order: Order) -> AnalysisResult<NumericArray> {
    let shape = shape.into_iter().map(|x| x as usize).collect::<Vec<_>>();
    let true_shape = shape.set_f(order == Order::Fortran);

    ArrayD::from_shape_vec(true_shape, data)
        .map_err(|e| AnalysisError::Decode(format!("shape error: {}", e)))
}

fn decode_error(e: std::io::Error) -> AnalysisError {
    AnalysisError::Decode(e.to_string())
}
