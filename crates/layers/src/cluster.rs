//! Greedy pixel-radius point clustering on a Web Mercator grid.
//!
//! Deterministic: points are visited in input order and each unassigned point
//! seeds a group with every unassigned point within the radius. Cluster ids
//! encode the seed index and zoom so a cluster can be re-derived from its id.

use std::collections::BTreeMap;

use foundation::LonLat;
use foundation::math::mercator::project_px;

const ZOOM_BITS: u64 = 5;
const ZOOM_MASK: u64 = (1 << ZOOM_BITS) - 1;

#[derive(Debug, Clone, PartialEq)]
pub struct PointGroup {
    /// `None` for a lone point.
    pub cluster_id: Option<u64>,
    pub position: LonLat,
    /// Indices into the clustered slice.
    pub members: Vec<usize>,
}

pub fn encode_cluster_id(seed: usize, zoom: u32) -> u64 {
    ((seed as u64) << ZOOM_BITS) | (u64::from(zoom) + 1)
}

/// `(seed, zoom)` of a cluster id, `None` for ids this module never issues.
pub fn decode_cluster_id(id: u64) -> Option<(usize, u32)> {
    let z = id & ZOOM_MASK;
    if z == 0 {
        return None;
    }
    Some(((id >> ZOOM_BITS) as usize, (z - 1) as u32))
}

/// Groups `points` at integer `zoom`. Above `max_zoom` nothing clusters.
pub fn cluster_points(points: &[LonLat], zoom: u32, radius_px: f64, max_zoom: u32) -> Vec<PointGroup> {
    if zoom > max_zoom || radius_px <= 0.0 {
        return points
            .iter()
            .enumerate()
            .map(|(i, &p)| PointGroup {
                cluster_id: None,
                position: p,
                members: vec![i],
            })
            .collect();
    }

    let z = f64::from(zoom);
    let px: Vec<[f64; 2]> = points.iter().map(|&p| project_px(p, z)).collect();
    let cell_of = |p: [f64; 2]| ((p[0] / radius_px).floor() as i64, (p[1] / radius_px).floor() as i64);

    let mut grid: BTreeMap<(i64, i64), Vec<usize>> = BTreeMap::new();
    for (i, &p) in px.iter().enumerate() {
        grid.entry(cell_of(p)).or_default().push(i);
    }

    let r2 = radius_px * radius_px;
    let mut assigned = vec![false; points.len()];
    let mut out = Vec::new();
    for seed in 0..points.len() {
        if assigned[seed] {
            continue;
        }
        assigned[seed] = true;
        let mut members = vec![seed];
        let (cx, cy) = cell_of(px[seed]);
        for dx in -1..=1 {
            for dy in -1..=1 {
                let Some(cell) = grid.get(&(cx + dx, cy + dy)) else {
                    continue;
                };
                for &j in cell {
                    if assigned[j] {
                        continue;
                    }
                    let ddx = px[j][0] - px[seed][0];
                    let ddy = px[j][1] - px[seed][1];
                    if ddx * ddx + ddy * ddy <= r2 {
                        assigned[j] = true;
                        members.push(j);
                    }
                }
            }
        }
        members.sort_unstable();

        if members.len() == 1 {
            out.push(PointGroup {
                cluster_id: None,
                position: points[seed],
                members,
            });
            continue;
        }
        let n = members.len() as f64;
        let lon = members.iter().map(|&i| points[i].lon).sum::<f64>() / n;
        let lat = members.iter().map(|&i| points[i].lat).sum::<f64>() / n;
        out.push(PointGroup {
            cluster_id: Some(encode_cluster_id(seed, zoom)),
            position: LonLat::new(lon, lat),
            members,
        });
    }
    out
}

/// Members of a cluster id issued by [`cluster_points`] for the same input.
pub fn cluster_members(points: &[LonLat], cluster_id: u64, radius_px: f64, max_zoom: u32) -> Option<Vec<usize>> {
    let (_, zoom) = decode_cluster_id(cluster_id)?;
    cluster_points(points, zoom, radius_px, max_zoom)
        .into_iter()
        .find(|g| g.cluster_id == Some(cluster_id))
        .map(|g| g.members)
}

/// First zoom at which the members no longer form a single group.
pub fn expansion_zoom(points: &[LonLat], members: &[usize], from_zoom: u32, radius_px: f64, max_zoom: u32) -> u32 {
    let subset: Vec<LonLat> = members.iter().filter_map(|&i| points.get(i).copied()).collect();
    for z in from_zoom + 1..=max_zoom {
        if cluster_points(&subset, z, radius_px, max_zoom).len() > 1 {
            return z;
        }
    }
    max_zoom + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_ids_round_trip_seed_and_zoom() {
        let id = encode_cluster_id(37, 12);
        assert_eq!(decode_cluster_id(id), Some((37, 12)));
        assert_eq!(decode_cluster_id(0), None);
    }

    #[test]
    fn nearby_points_group_and_far_points_stay_alone() {
        let points = [
            LonLat::new(2.35, 48.85),
            LonLat::new(2.351, 48.851),
            LonLat::new(-73.98, 40.75),
        ];
        let groups = cluster_points(&points, 5, 50.0, 17);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].members, vec![0, 1]);
        assert!(groups[0].cluster_id.is_some());
        assert_eq!(groups[1].cluster_id, None);
        assert_eq!(groups[1].members, vec![2]);
    }

    #[test]
    fn nothing_clusters_above_max_zoom() {
        let points = [LonLat::new(0.0, 0.0), LonLat::new(0.0, 0.0)];
        assert_eq!(cluster_points(&points, 18, 50.0, 17).len(), 2);
        assert_eq!(cluster_points(&points, 17, 50.0, 17).len(), 1);
    }

    #[test]
    fn members_are_recoverable_from_the_id() {
        let points = [
            LonLat::new(2.35, 48.85),
            LonLat::new(2.36, 48.86),
            LonLat::new(120.0, -30.0),
        ];
        let groups = cluster_points(&points, 4, 50.0, 17);
        let id = groups[0].cluster_id.unwrap();
        assert_eq!(cluster_members(&points, id, 50.0, 17), Some(vec![0, 1]));
    }

    #[test]
    fn coincident_points_never_expand_before_max_zoom() {
        let points = [LonLat::new(0.0, 0.0), LonLat::new(0.0, 0.0)];
        assert_eq!(expansion_zoom(&points, &[0, 1], 3, 50.0, 17), 18);

        let spread = [LonLat::new(2.35, 48.85), LonLat::new(2.36, 48.86)];
        let z = expansion_zoom(&spread, &[0, 1], 3, 50.0, 17);
        assert!(z > 3 && z <= 17);
    }
}
