use hypertile::{
    GeometryConfig, GeometryContext, GeometryKind, RaycastConfig, Variation,
    WorldHeightConfig,
};
use validator::ValidationErrors;

fn error_fields(config: &GeometryConfig) -> Vec<String> {
    let mut context = GeometryContext::default();
    // This is a bit of a lazy check but it works well enough
    let err = context.set_current(config).unwrap_err();
    let validation_errors = err.downcast::<ValidationErrors>().unwrap();
    let mut error_fields = validation_errors
        .errors()
        .keys()
        .map(|key| key.to_string())
        .collect::<Vec<String>>();
    error_fields.sort_unstable();
    error_fields
}

#[test]
fn test_geometry_config_validation() {
    let config = GeometryConfig {
        geometry: GeometryKind::Regular { face: 7, vertex: 3 },
        variation: Variation::Goldberg { a: 40, b: 0 }, // invalid
        heights: WorldHeightConfig {
            depth: -1.0,       // invalid
            lake_top: 20.0,    // invalid
            camera: -1.0,      // valid (but weird)
            wall_height: -0.3, // valid, builds the world upside down
            ..Default::default()
        },
        creature_scale: 0.0,    // invalid
        boundary_ratio: 1.5,    // invalid
        projection_alpha: None, // valid
        show_3d: true,          // valid
        raycast: RaycastConfig {
            max_cells: 0,          // invalid
            reflect_val: 0.5,      // valid
            hard_limit: Some(1.0), // valid
            ..Default::default()
        },
    };
    assert_eq!(
        error_fields(&config),
        vec![
            "boundary_ratio",
            "creature_scale",
            "heights",
            "raycast",
            "variation"
        ]
    );
}

#[test]
fn test_geometry_kind_validation() {
    let config = GeometryConfig {
        geometry: GeometryKind::Regular { face: 2, vertex: 3 },
        variation: Variation::Pure,
        ..Default::default()
    };
    assert_eq!(error_fields(&config), vec!["geometry"]);

    let config = GeometryConfig {
        geometry: GeometryKind::Nil { width: 0.0 },
        variation: Variation::Pure,
        ..Default::default()
    };
    assert_eq!(error_fields(&config), vec!["geometry"]);
}

#[test]
fn test_combination_validation() {
    // Variations only apply to 2D tilings
    let config = GeometryConfig {
        geometry: GeometryKind::Solv,
        variation: Variation::Bitruncated,
        ..Default::default()
    };
    assert_eq!(error_fields(&config), vec!["__all__"]);

    // Goldberg needs three or four cells around a vertex
    let config = GeometryConfig {
        geometry: GeometryKind::Regular { face: 5, vertex: 5 },
        variation: Variation::Goldberg { a: 2, b: 1 },
        ..Default::default()
    };
    assert_eq!(error_fields(&config), vec!["__all__"]);
}

#[test]
fn test_valid_config_builds() {
    let mut context = GeometryContext::default();
    let params = context.set_current(&GeometryConfig::default()).unwrap();
    assert!(params.invalid.is_none());
    assert_eq!(context.current_config(), Some(&GeometryConfig::default()));
}
