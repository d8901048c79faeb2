//! Transform math for joint hierarchies
//!
//! Matrices are row-major with row-vector convention: positions transform as
//! `v' = v * M`, translation lives in row 3, and a child's world transform is
//! `local * parent_world`. Flattened row-major, this layout matches glTF's
//! column-major element order directly.

pub type Mat4 = [[f32; 4]; 4];

/// Identity matrix
pub const IDENTITY_MATRIX: Mat4 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Multiply two 4x4 matrices
pub fn multiply(a: Mat4, b: Mat4) -> Mat4 {
    let mut result = [[0.0f32; 4]; 4];

    for i in 0..4 {
        for j in 0..4 {
            result[i][j] =
                a[i][0] * b[0][j] + a[i][1] * b[1][j] + a[i][2] * b[2][j] + a[i][3] * b[3][j];
        }
    }

    result
}

/// Invert a rigid transform matrix (orthonormal rotation + translation)
pub fn invert_rigid(m: Mat4) -> Mat4 {
    // Transpose the 3x3 rotation part, then counter-rotate the translation.
    let mut result = IDENTITY_MATRIX;

    for i in 0..3 {
        for j in 0..3 {
            result[i][j] = m[j][i];
        }
    }

    let tx = m[3][0];
    let ty = m[3][1];
    let tz = m[3][2];

    result[3][0] = -(result[0][0] * tx + result[1][0] * ty + result[2][0] * tz);
    result[3][1] = -(result[0][1] * tx + result[1][1] * ty + result[2][1] * tz);
    result[3][2] = -(result[0][2] * tx + result[1][2] * ty + result[2][2] * tz);

    result
}

/// Convert quaternion (x, y, z, w) to rotation matrix
pub fn quaternion_to_matrix(q: [f32; 4]) -> Mat4 {
    let [x, y, z, w] = q;

    let xx = x * x;
    let xy = x * y;
    let xz = x * z;
    let xw = x * w;
    let yy = y * y;
    let yz = y * z;
    let yw = y * w;
    let zz = z * z;
    let zw = z * w;

    [
        [1.0 - 2.0 * (yy + zz), 2.0 * (xy - zw), 2.0 * (xz + yw), 0.0],
        [2.0 * (xy + zw), 1.0 - 2.0 * (xx + zz), 2.0 * (yz - xw), 0.0],
        [2.0 * (xz - yw), 2.0 * (yz + xw), 1.0 - 2.0 * (xx + yy), 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]
}

/// Compose a local transform from translation, rotation and scale
pub fn trs_matrix(translation: [f32; 3], rotation: [f32; 4], scale: [f32; 3]) -> Mat4 {
    let mut m = quaternion_to_matrix(rotation);
    for (i, s) in scale.iter().enumerate() {
        for v in m[i].iter_mut() {
            *v *= s;
        }
    }
    m[3][0] = translation[0];
    m[3][1] = translation[1];
    m[3][2] = translation[2];
    m
}

/// Transform a position by a matrix (row-vector convention, w = 1)
pub fn transform_position(p: [f32; 3], m: &Mat4) -> [f32; 3] {
    [
        p[0] * m[0][0] + p[1] * m[1][0] + p[2] * m[2][0] + m[3][0],
        p[0] * m[0][1] + p[1] * m[1][1] + p[2] * m[2][1] + m[3][1],
        p[0] * m[0][2] + p[1] * m[1][2] + p[2] * m[2][2] + m[3][2],
    ]
}

/// Scale a matrix by a weight and accumulate (for influence blending)
pub fn accumulate_weighted(acc: &mut Mat4, m: &Mat4, weight: f32) {
    for i in 0..4 {
        for j in 0..4 {
            acc[i][j] += m[i][j] * weight;
        }
    }
}

/// Zero matrix, the accumulator seed for influence blending
pub const ZERO_MATRIX: Mat4 = [[0.0; 4]; 4];

/// Flatten to glTF's 16-element column-major layout
pub fn to_gltf_array(m: Mat4) -> [f32; 16] {
    let mut out = [0.0f32; 16];
    for i in 0..4 {
        out[i * 4..i * 4 + 4].copy_from_slice(&m[i]);
    }
    out
}
