//! Pixel ↔ point conversion through stream intrinsics.

use super::frame::{DistortionModel, Intrinsics};

/// Convert pixel (`px`, `py`) at `depth` metres into a camera-space point in metres.
pub fn deproject_pixel_to_point(intrin: &Intrinsics, pixel: [f32; 2], depth: f32) -> [f32; 3] {
    let mut x = (pixel[0] - intrin.ppx) / intrin.fx;
    let mut y = (pixel[1] - intrin.ppy) / intrin.fy;
    let c = &intrin.coeffs;

    match intrin.model {
        DistortionModel::InverseBrownConrady => {
            let r2 = x * x + y * y;
            let f = 1.0 + c[0] * r2 + c[1] * r2 * r2 + c[4] * r2 * r2 * r2;
            let ux = x * f + 2.0 * c[2] * x * y + c[3] * (r2 + 2.0 * x * x);
            let uy = y * f + 2.0 * c[3] * x * y + c[2] * (r2 + 2.0 * y * y);
            x = ux;
            y = uy;
        }
        DistortionModel::BrownConrady => {
            let (xo, yo) = (x, y);
            for _ in 0..10 {
                let r2 = x * x + y * y;
                let icdist = 1.0 / (1.0 + ((c[4] * r2 + c[1]) * r2 + c[0]) * r2);
                let delta_x = 2.0 * c[2] * x * y + c[3] * (r2 + 2.0 * x * x);
                let delta_y = 2.0 * c[3] * x * y + c[2] * (r2 + 2.0 * y * y);
                x = (xo - delta_x) * icdist;
                y = (yo - delta_y) * icdist;
            }
        }
        DistortionModel::None | DistortionModel::ModifiedBrownConrady => {}
    }

    [depth * x, depth * y, depth]
}

/// Project a camera-space point (metres) onto the image plane.
pub fn project_point_to_pixel(intrin: &Intrinsics, point: [f32; 3]) -> [f32; 2] {
    let mut x = point[0] / point[2];
    let mut y = point[1] / point[2];
    let c = &intrin.coeffs;

    match intrin.model {
        DistortionModel::ModifiedBrownConrady | DistortionModel::BrownConrady => {
            let r2 = x * x + y * y;
            let f = 1.0 + c[0] * r2 + c[1] * r2 * r2 + c[4] * r2 * r2 * r2;
            let (xf, yf) = (x * f, y * f);
            // The modified model feeds the radially distorted coordinates into the tangential terms.
            let (tx, ty) = if intrin.model == DistortionModel::ModifiedBrownConrady {
                (xf, yf)
            } else {
                (x, y)
            };
            x = xf + 2.0 * c[2] * tx * ty + c[3] * (r2 + 2.0 * tx * tx);
            y = yf + 2.0 * c[3] * tx * ty + c[2] * (r2 + 2.0 * ty * ty);
        }
        DistortionModel::InverseBrownConrady | DistortionModel::None => {}
    }

    [x * intrin.fx + intrin.ppx, y * intrin.fy + intrin.ppy]
}

/// Lateral offset of pixel (`px`, `py`) at `depth` using only the field of
/// view: `tan((p − c)/c · fov/2) · depth` per axis. Returns `[x, y, depth]`
/// in the unit of `depth`.
pub fn fov_offset(pixel: [f32; 2], size: [u32; 2], fov_deg: [f32; 2], depth: f32) -> [f32; 3] {
    let half_w = size[0] as f32 / 2.0;
    let half_h = size[1] as f32 / 2.0;
    let ang_x = ((pixel[0] - half_w) / half_w * (fov_deg[0] / 2.0)).to_radians();
    let ang_y = ((pixel[1] - half_h) / half_h * (fov_deg[1] / 2.0)).to_radians();
    [ang_x.tan() * depth, ang_y.tan() * depth, depth]
}
