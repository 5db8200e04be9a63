use crate::geo::LonLat;

/// Tile size in pixels at zoom 0.
pub const TILE_SIZE_PX: f64 = 512.0;

/// Latitude limit of the square Web Mercator world.
pub const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

/// World size in pixels at `zoom`.
pub fn world_size_px(zoom: f64) -> f64 {
    TILE_SIZE_PX * 2f64.powf(zoom)
}

/// Projects to Web Mercator pixel coordinates at `zoom` (origin top-left).
pub fn project_px(p: LonLat, zoom: f64) -> [f64; 2] {
    let size = world_size_px(zoom);
    let lat = p.lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
    let x = (p.lon + 180.0) / 360.0 * size;
    let y = (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / std::f64::consts::PI) / 2.0 * size;
    [x, y]
}

pub fn unproject_px(px: [f64; 2], zoom: f64) -> LonLat {
    let size = world_size_px(zoom);
    let lon = px[0] / size * 360.0 - 180.0;
    let n = std::f64::consts::PI * (1.0 - 2.0 * px[1] / size);
    let lat = n.sinh().atan().to_degrees();
    LonLat::new(lon, lat)
}
