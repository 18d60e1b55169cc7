use crate::{
    error::Result,
    geo::LatLon,
    kv::KvClient,
    model::{Zone, ZoneBounds, ZonesConfig},
};

/// Rectangle bounds in (lat, lon) covered by the whole zone grid.
#[derive(Debug, Clone, Copy)]
pub struct GridBounds {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

fn build_grid(rows: u32, cols: u32, bounds: GridBounds) -> ZonesConfig {
    let lat_step = (bounds.lat_max - bounds.lat_min) / rows as f64;
    let lon_step = (bounds.lon_max - bounds.lon_min) / cols as f64;

    let name_of = |r: u32, c: u32| format!("z_{r}_{c}");
    let mut zones = Vec::with_capacity((rows * cols) as usize);
    for r in 0..rows {
        for c in 0..cols {
            let lat_min = bounds.lat_min + lat_step * r as f64;
            let lat_max = lat_min + lat_step;
            let lon_min = bounds.lon_min + lon_step * c as f64;
            let lon_max = lon_min + lon_step;

            let mut neighbors = vec![];
            if r > 0 {
                neighbors.push(name_of(r - 1, c));
            }
            if r + 1 < rows {
                neighbors.push(name_of(r + 1, c));
            }
            if c > 0 {
                neighbors.push(name_of(r, c - 1));
            }
            if c + 1 < cols {
                neighbors.push(name_of(r, c + 1));
            }

            zones.push(Zone {
                name: name_of(r, c),
                row: r,
                col: c,
                bounds: ZoneBounds {
                    lat_min,
                    lat_max,
                    lon_min,
                    lon_max,
                },
                charge: LatLon::new((lat_min + lat_max) / 2.0, (lon_min + lon_max) / 2.0),
                neighbors,
            });
        }
    }

    ZonesConfig { rows, cols, zones }
}

/// Idempotent bootstrap for `zones_config`: writes the grid only if the key is still missing.
/// Mirrors the gateway's "created once on first use, immutable thereafter" contract without
/// depending on the out-of-scope gateway process.
pub async fn ensure_zones_config(
    kv: &dyn KvClient,
    rows: u32,
    cols: u32,
    bounds: GridBounds,
) -> Result<ZonesConfig> {
    if let Some(existing) = kv.get("zones_config").await? {
        if let Ok(cfg) = serde_json::from_value::<ZonesConfig>(existing) {
            return Ok(cfg);
        }
    }

    let cfg = build_grid(rows, cols, bounds);
    let value = serde_json::to_value(&cfg)?;
    // Best-effort: if a concurrent bootstrap wins the race, re-read its value instead of
    // asserting ours. zones_config is immutable once present, so either copy is equally valid.
    kv.put("zones_config", value).await?;
    if let Some(existing) = kv.get("zones_config").await? {
        if let Ok(cfg) = serde_json::from_value::<ZonesConfig>(existing) {
            return Ok(cfg);
        }
    }
    Ok(cfg)
}

/// Nearest charge point to `pos` among all zones in `cfg`.
pub fn nearest_charge_point(cfg: &ZonesConfig, pos: LatLon) -> LatLon {
    cfg.zones
        .iter()
        .map(|z| z.charge)
        .min_by(|a, b| {
            let da = crate::geo::haversine_km(pos, *a);
            let db = crate::geo::haversine_km(pos, *b);
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or(pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_has_four_neighbor_adjacency() {
        let bounds = GridBounds {
            lat_min: 0.0,
            lat_max: 2.0,
            lon_min: 0.0,
            lon_max: 2.0,
        };
        let cfg = build_grid(2, 2, bounds);
        assert_eq!(cfg.zones.len(), 4);
        let corner = cfg.zones.iter().find(|z| z.row == 0 && z.col == 0).unwrap();
        assert_eq!(corner.neighbors.len(), 2);
        let center_like = cfg.zones.iter().find(|z| z.row == 1 && z.col == 1).unwrap();
        assert_eq!(center_like.neighbors.len(), 2);
    }

    #[test]
    fn zone_for_finds_containing_cell() {
        let bounds = GridBounds {
            lat_min: 0.0,
            lat_max: 10.0,
            lon_min: 0.0,
            lon_max: 10.0,
        };
        let cfg = build_grid(2, 2, bounds);
        let z = cfg.zone_for(LatLon::new(1.0, 1.0)).unwrap();
        assert_eq!(z.name, "z_0_0");
        let z2 = cfg.zone_for(LatLon::new(9.0, 9.0)).unwrap();
        assert_eq!(z2.name, "z_1_1");
    }
}
