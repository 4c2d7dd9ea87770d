//! Generation of the raycasting program. The program is specialized to the
//! geometry: closed-form families get exact wall intersections, the others
//! integrate their geodesics in small steps. Programs are cached by
//! [ShaderKey], since compiling one is far more expensive than building it.

mod ast;
mod fragments;

pub use ast::ShaderProgram;

use crate::{
    geometry::{BinaryMove, GeometryFamily, GeometryParameterSet},
    math::Curvature,
    raycast::{
        map::MATRIX_INDEX_SCALE,
        walls::{LayoutKey, WallLayout, MAX_PACKED_SIDES},
        RaycastSettings, MIN_VISIBLE, TEXTURE_WIDTH, VFAR, VNEAR,
    },
    timed, unwrap_or_bail,
};
use anyhow::ensure;
use ast::{Block, Stage, Uniform};
use fnv::FnvHashMap;
use fragments::glsl;
use log::debug;
use serde::Serialize;
use std::{
    f64::consts::LN_2,
    hash::{Hash, Hasher},
    rc::Rc,
};

/// Binary tiling sides bounded by horocycles, towards the parents and
/// towards the children
const BINARY_UP: [BinaryMove; 2] =
    [BinaryMove::ParentFromLeft, BinaryMove::ParentFromRight];
const BINARY_DOWN: [BinaryMove; 2] =
    [BinaryMove::LeftChild, BinaryMove::RightChild];

/// Everything besides the geometry and the wall layout that changes the
/// generated source
#[derive(Copy, Clone, Debug, Serialize)]
pub struct ShaderFlags {
    pub step_based: bool,
    pub reflective: bool,
    pub reflect_val: f64,
    pub volumetric: bool,
    pub many_cell_types: bool,
    pub max_iter: u32,
    pub maxstep: f64,
    pub minstep: f64,
    pub hard_limit: f64,
    /// Size of the matrix array
    pub capacity: usize,
}

impl ShaderFlags {
    fn bits(&self) -> impl PartialEq + Hash {
        (
            (
                self.step_based,
                self.reflective,
                self.volumetric,
                self.many_cell_types,
            ),
            (self.max_iter, self.capacity),
            [
                self.reflect_val.to_bits(),
                self.maxstep.to_bits(),
                self.minstep.to_bits(),
                self.hard_limit.to_bits(),
            ],
        )
    }
}

impl PartialEq for ShaderFlags {
    fn eq(&self, other: &Self) -> bool {
        self.bits() == other.bits()
    }
}

impl Eq for ShaderFlags {}

impl Hash for ShaderFlags {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits().hash(state);
    }
}

/// Identifies a generated program. Two builders with equal keys generate
/// the same source.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShaderKey {
    pub signature: String,
    pub layout: LayoutKey,
    pub flags: ShaderFlags,
}

/// Generated programs, by key
#[derive(Debug, Default)]
pub struct ShaderCache {
    programs: FnvHashMap<ShaderKey, Rc<ShaderProgram>>,
}

impl ShaderCache {
    /// Get the program for a key, building it if it isn't cached yet. A
    /// failed build caches nothing.
    pub fn get_or_build(
        &mut self,
        key: ShaderKey,
        build: impl FnOnce() -> anyhow::Result<ShaderProgram>,
    ) -> anyhow::Result<Rc<ShaderProgram>> {
        if let Some(program) = self.programs.get(&key) {
            return Ok(Rc::clone(program));
        }
        let program = Rc::new(build()?);
        self.programs.insert(key, Rc::clone(&program));
        Ok(program)
    }

    pub fn clear(&mut self) {
        self.programs.clear();
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

/// Assembles the raycasting program for one geometry, wall layout and set of
/// settings
pub struct RaycastShaderBuilder<'a> {
    params: &'a GeometryParameterSet,
    layout: &'a WallLayout,
    settings: &'a RaycastSettings,
    flags: ShaderFlags,
}

impl<'a> RaycastShaderBuilder<'a> {
    pub fn new(
        params: &'a GeometryParameterSet,
        layout: &'a WallLayout,
        settings: &'a RaycastSettings,
        capacity: usize,
    ) -> Self {
        let family = params.family;
        let reflective = settings.reflect_val > 0.0
            && (family == GeometryFamily::Solv
                || (family != GeometryFamily::Nil
                    && layout.reflection_offset().is_some()));
        let flags = ShaderFlags {
            step_based: family.is_step_based(),
            reflective,
            reflect_val: settings.reflect_val,
            volumetric: settings.volumetric,
            many_cell_types: layout.many_cell_types(),
            max_iter: settings.max_iter,
            maxstep: settings.maxstep,
            minstep: settings.minstep,
            hard_limit: settings.hard_limit,
            capacity,
        };
        Self {
            params,
            layout,
            settings,
            flags,
        }
    }

    pub fn flags(&self) -> &ShaderFlags {
        &self.flags
    }

    pub fn key(&self) -> ShaderKey {
        ShaderKey {
            signature: self.params.signature.clone(),
            layout: self.layout.key(),
            flags: self.flags,
        }
    }

    fn family(&self) -> GeometryFamily {
        self.params.family
    }

    /// Values of the scalar uniforms the program declares. Matrices,
    /// textures and the fog color are up to the caller.
    pub fn uniform_values(&self) -> Vec<(&'static str, f64)> {
        let settings = self.settings;
        let mut values = vec![
            ("uLength", TEXTURE_WIDTH as f64),
            ("uLinearSightRange", settings.linear_sight_range),
            ("uExpStart", settings.exp_start),
            ("uExpDecay", settings.exp_decay),
        ];
        if let Some(plevel) = self.params.plevel() {
            values.push(("uPLevel", plevel / 2.0));
        }
        if let Some(binary) = self.params.binary_tables() {
            values.push(("uBLevel", binary.level_step / 2.0));
        }
        values
    }

    /// Generate the program
    pub fn build(&self) -> anyhow::Result<ShaderProgram> {
        ensure!(
            self.flags.capacity >= self.layout.matrices().len(),
            "matrix array of {} can't hold the {} wall matrices",
            self.flags.capacity,
            self.layout.matrices().len()
        );
        let family = self.family();
        if family.is_hybrid() {
            ensure!(
                self.params.plevel().is_some(),
                "{} geometry without fiber levels",
                family
            );
        }

        let program = timed!("Raycaster generation", {
            ShaderProgram {
                vertex: vertex_stage().render(),
                fragment: self.fragment_stage()?.render(),
            }
        });
        debug!(
            "Raycaster for {}: {} lines of fragment source",
            self.params.signature,
            program.fragment.lines().count()
        );
        Ok(program)
    }

    fn fragment_stage(&self) -> anyhow::Result<Stage> {
        let family = self.family();
        let flags = &self.flags;
        let mut stage = Stage::default();
        stage
            .uniform(Uniform::new("int", "uLength"))
            .uniform(Uniform::new("mat4", "uStart"))
            .uniform(Uniform::array("mat4", "uM", flags.capacity))
            .uniform(Uniform::new("vec2", "uStartid"))
            .uniform(Uniform::new("sampler2D", "tConnections"))
            .uniform(Uniform::new("sampler2D", "tWallcolor"))
            .uniform(Uniform::new("sampler2D", "tTextureMap"));
        if flags.volumetric {
            stage.uniform(Uniform::new("sampler2D", "tVolumetric"));
        }
        stage
            .uniform(Uniform::new("vec4", "uFogColor"))
            .uniform(Uniform::new("float", "uLinearSightRange"))
            .uniform(Uniform::new("float", "uExpStart"))
            .uniform(Uniform::new("float", "uExpDecay"));
        if family.is_hybrid() {
            stage
                .uniform(Uniform::new("float", "uPLevel"))
                .uniform(Uniform::new("mat4", "uLP"));
        }
        if family == GeometryFamily::BinaryTiling {
            stage.uniform(Uniform::new("float", "uBLevel"));
        }

        stage.global("varying mediump vec4 at;");
        if flags.many_cell_types {
            stage
                .uniform(Uniform::new("int", "uWallOffset"))
                .uniform(Uniform::new("int", "uSides"))
                .global("int walloffset, sides;");
        } else {
            stage.global(format!(
                "const int walloffset = 0; const int sides = {};",
                self.layout.degree()
            ));
        }

        if family == GeometryFamily::BinaryTiling {
            if let Some(xpush) = fragments::xpush(Curvature::Hyperbolic) {
                stage.function(xpush);
            }
        }
        stage.function(fragments::len(family));
        for function in fragments::acceleration(family) {
            stage.function(function);
        }
        if family == GeometryFamily::Nil {
            for function in fragments::nil_translations() {
                stage.function(function);
            }
        }

        let mut main = self.prologue();
        main.for_loop(
            format!("int iter=0; iter<{}; iter++", flags.max_iter),
            self.iteration()?,
        );
        main.append(self.epilogue());
        stage.main = main;
        Ok(stage)
    }

    /// Ray setup: direction, starting point and the starting cell
    fn prologue(&self) -> Block {
        let family = self.family();
        let flags = &self.flags;
        let mut block = Block::new();
        if flags.reflective {
            block.line("bool depthtoset = true;");
        }
        block.lines(vec![
            "gl_FragColor = vec4(0., 0., 0., 1.);",
            "mediump float left = 1.;",
            "mediump vec4 at0 = at;",
            "at0.y = -at0.y;",
            "at0.w = 0.;",
            "at0.xyz = at0.xyz / length(at0.xyz);",
        ]);
        if flags.step_based {
            block
                .line(format!(
                    "const mediump float maxstep = {};",
                    glsl(flags.maxstep)
                ))
                .line(format!(
                    "const mediump float minstep = {};",
                    glsl(flags.minstep)
                ))
                .line("mediump float next = maxstep;");
        }

        if family.is_hybrid() {
            let zpos = match family.curvature() {
                Curvature::Hyperbolic => {
                    "mediump float zpos = log(position.z*position.z \
                     - position.x*position.x - position.y*position.y)/2.;"
                }
                Curvature::Spherical => {
                    "mediump float zpos = log(position.z*position.z \
                     + position.x*position.x + position.y*position.y)/2.;"
                }
                Curvature::Euclidean => "mediump float zpos = log(position.z);",
            };
            let mut horizontal = Block::new();
            horizontal.line(
                "tangent = uStart * exp(-zpos) * vec4(at1.xy, 0., 0.) \
                 / xspeed;",
            );
            block
                .line("mediump vec4 position = uStart * vec4(0., 0., 1., 0.);")
                .line("mediump vec4 at1 = uLP * at0;")
                .line(zpos)
                .lines(vec![
                    "position *= exp(-zpos);",
                    "mediump float zspeed = at1.z;",
                    "mediump float xspeed = length(at1.xy);",
                    "mediump vec4 tangent = vec4(0.);",
                ])
                .if_then("xspeed > 0.", horizontal);
        } else {
            block.lines(vec![
                "mediump vec4 position = uStart * vec4(0., 0., 0., 1.);",
                "mediump vec4 tangent = uStart * at0;",
            ]);
        }

        if flags.many_cell_types {
            block.line("walloffset = uWallOffset; sides = uSides;");
        }
        block
            .line("mediump float go = 0.;")
            .line("mediump vec2 cid = uStartid;");
        block
    }

    /// One pass of the main loop: find the next wall, move there, shade it,
    /// then bounce off it or cross it
    fn iteration(&self) -> anyhow::Result<Block> {
        let family = self.family();
        let flags = &self.flags;
        let mut block = Block::new();
        block
            .line(format!("if(left < {}) break;", glsl(MIN_VISIBLE)))
            .line("mediump float dist = 100.;")
            .line("int which = -1;");
        if family == GeometryFamily::Product(Curvature::Euclidean) {
            block.line("tangent.w = position.w = 0.;");
        }
        if flags.reflective {
            block.line("bool reflect = false;");
        }

        if flags.step_based {
            block.append(self.step()?);
        } else {
            block.append(self.closed_form_walls());
            block.append(fragments::advance(family));
        }
        block.append(fragments::renormalize(family));
        if family == GeometryFamily::BinaryTiling {
            let up: Vec<_> = BINARY_UP.iter().map(|m| m.index()).collect();
            let down: Vec<_> = BINARY_DOWN.iter().map(|m| m.index()).collect();
            block.append(fragments::resolve_horocycle(&up, &down));
        }
        if flags.volumetric {
            block.append(fragments::volumetric(flags.hard_limit));
        }
        block.line("go = go + dist;").line("if(which == -1) continue;");

        let mirrors = self.layout.mirrors();
        if !mirrors.is_empty() {
            let mut bounce = Block::new();
            bounce
                .line("tangent = uM[which] * tangent;")
                .line("continue;");
            block.if_then(format!("which >= {}", mirrors.start), bounce);
        }

        block.append(self.shade());
        if flags.reflective {
            let binary = family == GeometryFamily::BinaryTiling;
            let horocycles: Vec<usize> = if binary {
                BINARY_UP
                    .iter()
                    .chain(BINARY_DOWN.iter())
                    .map(|m| m.index())
                    .collect()
            } else {
                Vec::new()
            };
            block.append(fragments::reflect(
                family,
                self.layout.reflection_offset(),
                &horocycles,
            ));
        }
        block.append(self.cross());
        Ok(block)
    }

    /// Exact distance to the nearest wall, for families with closed-form
    /// geodesics
    fn closed_form_walls(&self) -> Block {
        let family = self.family();
        let degree = self.layout.degree();

        let mut wall = Block::new();
        let bound = if family.is_hybrid() { "sides-2" } else { "sides" };
        wall.line(format!("if(i >= {}) break;", bound));
        if family == GeometryFamily::BinaryTiling {
            // Horocyclic sides are handled separately
            let skipped = BINARY_UP
                .iter()
                .chain(BINARY_DOWN.iter())
                .map(|m| format!("i == {}", m.index()))
                .collect::<Vec<_>>()
                .join(" || ");
            wall.line(format!("if({}) continue;", skipped));
        }
        wall.append(fragments::wall_distance(family, &fragments::wall("i")))
            .line("if(d < dist) { dist = d; which = i; }");
        let mut walls = Block::new();
        walls.for_loop(format!("int i=0; i<{}; i++", degree), wall);

        let mut block = Block::new();
        if family.is_hybrid() {
            block.if_then("xspeed > 0.", walls);
        } else {
            block.append(walls);
        }

        let mirrors = self.layout.mirrors();
        if !mirrors.is_empty() {
            let mut mirror = fragments::wall_distance(family, "uM[i]");
            mirror.line("if(d < dist) { dist = d; which = i; }");
            block.for_loop(
                format!("int i={}; i<{}; i++", mirrors.start, mirrors.end),
                mirror,
            );
        }
        if family == GeometryFamily::BinaryTiling {
            block.append(fragments::horocycle_walls());
        }
        if family.is_hybrid() {
            block.append(fragments::fiber_walls());
        }
        block
            .line("if(dist < 0.) { dist = 0.; }")
            .line("if(which == -1 && dist == 0.) return;");
        block
    }

    /// One integration step. A step that leaves the cell is retried at
    /// half the length until it is shorter than `minstep`; then the ray
    /// crosses.
    fn step(&self) -> anyhow::Result<Block> {
        let family = self.family();
        let mut block = Block::new();
        block.line("dist = next < minstep ? 2.*next : next;");

        let (half_width, half_height) = match family {
            GeometryFamily::Nil => {
                let lattice = unwrap_or_bail!(
                    self.params.lattice_tables(),
                    "Nil geometry without a lattice"
                );
                (lattice.width / 2.0, lattice.width * lattice.width / 2.0)
            }
            GeometryFamily::Solv => {
                let lattice = unwrap_or_bail!(
                    self.params.lattice_tables(),
                    "Solv geometry without a lattice"
                );
                (lattice.width / 2.0, LN_2 / 2.0)
            }
            _ => (0.0, 0.0),
        };

        match family {
            GeometryFamily::Nil => {
                block.append(fragments::nil_step()).line(
                    "mediump float rz = (abs(nposition.x) > abs(nposition.y) \
                     ? -nposition.x*nposition.y : 0.) + nposition.z;",
                );
            }
            GeometryFamily::RotationSpace(_) => {
                block
                    .append(fragments::runge_kutta(family))
                    .append(fragments::nearest_wall());
            }
            _ => {
                block.append(fragments::runge_kutta(family));
            }
        }

        let mut retry = Block::new();
        retry.line("next = dist / 2.;").line("continue;");
        let mut inside = Block::new();
        inside
            .if_then(fragments::outside(family, half_width, half_height), retry)
            .line("if(next < maxstep) next = next / 2.;");
        let mut crossing =
            fragments::exit_side(family, half_width, half_height);
        crossing.line("next = maxstep;");
        block.if_else("next >= minstep", inside, crossing);

        match family {
            GeometryFamily::Nil => {
                block.line("tangent = translatev(position, xt);");
            }
            GeometryFamily::RotationSpace(_) => {
                let mut update = Block::new();
                update.line(
                    "tangent = tangent + (acc1+2.*acc2+2.*acc3+acc4)\
                     /(6.*dist*xspeed);",
                );
                block.if_then("xspeed > 0.", update);
            }
            _ => {
                block.line(
                    "tangent = tangent + (acc1+2.*acc2+2.*acc3+acc4)\
                     /(6.*dist);",
                );
            }
        }
        block.line("position = nposition;");
        if family.is_hybrid() {
            block.line("zpos = nzpos;");
        }
        Ok(block)
    }

    /// Color of the wall just hit, mixed into the pixel
    fn shade(&self) -> Block {
        let family = self.family();
        let flags = &self.flags;

        let mut hit = Block::new();
        hit.line("mediump float gou = go;");
        if self.settings.has_hard_limit() {
            hit.line(format!(
                "if(gou > {}) {{ gl_FragDepth = 1.; return; }}",
                glsl(flags.hard_limit)
            ));
        }
        hit.lines(vec![
            "mediump vec3 tmap = texture2D(tTextureMap, u).rgb;",
            "col.xyz *= 1. - tmap.x;",
        ])
        .append(fragments::fog(flags.volumetric));
        if flags.reflective {
            let mut mark = Block::new();
            mark.line(format!("col.w = {};", glsl(1.0 - flags.reflect_val)))
                .line("reflect = true;");
            hit.if_then("col.w == 1.", mark);
        }
        hit.line("gl_FragColor.xyz += left * col.xyz * col.w;");

        let mut depth = Block::new();
        if matches!(
            family,
            GeometryFamily::Hyperbolic | GeometryFamily::BinaryTiling
        ) {
            depth.line("mediump vec4 t = at0 * sinh(go);");
        } else {
            depth.line("mediump vec4 t = at0 * go;");
        }
        depth
            .line("t.w = 1.;")
            .line(format!(
                "gl_FragDepth = ({}+t.w*{}/t.z)/{};",
                glsl(-VNEAR - VFAR),
                glsl(2.0 * VNEAR * VFAR),
                glsl(VNEAR - VFAR)
            ))
            .line("gl_FragDepth = (gl_FragDepth + 1.) / 2.;");
        if flags.reflective {
            depth.line("depthtoset = false;");
            hit.if_then("reflect && depthtoset", depth);
        } else {
            depth.line("return;");
            hit.if_then("col.w == 1.", depth);
        }
        hit.line("left *= (1. - col.w);");

        let mut block = Block::new();
        block
            .line(
                "mediump vec2 u = cid \
                 + vec2(float(which) / float(uLength), 0);",
            )
            .line("mediump vec4 col = texture2D(tWallcolor, u);")
            .if_then("col[3] > 0.0", hit);
        block
    }

    /// Move into the cell on the other side of wall `which`
    fn cross(&self) -> Block {
        let family = self.family();
        let mut block = Block::new();
        block
            .line("mediump vec4 connection = texture2D(tConnections, u);")
            .line("cid = connection.xy;");
        if family.is_hybrid() {
            block
                .line("if(which == sides-2) { zpos += uPLevel+uPLevel; }")
                .line("if(which == sides-1) { zpos -= uPLevel+uPLevel; }");
        }
        block
            .line(format!(
                "int mid = int(connection.z * {});",
                glsl(f64::from(MATRIX_INDEX_SCALE))
            ))
            .line(format!(
                "mediump mat4 m = uM[mid] * {};",
                fragments::wall("which")
            ))
            .line("position = m * position;")
            .line("tangent = m * tangent;");
        if self.flags.many_cell_types {
            block
                .line("walloffset = int(connection.w * 256.);")
                .line(format!(
                    "sides = int(connection.w * {}.) - {} * walloffset;",
                    TEXTURE_WIDTH, MAX_PACKED_SIDES
                ));
        }
        block
    }

    /// Whatever light is left comes from the fog
    fn epilogue(&self) -> Block {
        let mut block = Block::new();
        block.line("gl_FragColor.xyz += left * uFogColor.xyz;");
        if self.flags.reflective {
            block.line("if(depthtoset) gl_FragDepth = 1.;");
        } else {
            block.line("gl_FragDepth = 1.;");
        }
        block
    }
}

/// The vertex stage only passes the view direction on
fn vertex_stage() -> Stage {
    let mut stage = Stage::default();
    stage
        .uniform(Uniform::new("mat4", "uProjection"))
        .global("attribute mediump vec4 aPosition;")
        .global("varying mediump vec4 at;");
    stage
        .main
        .line("gl_Position = aPosition;")
        .line("at = uProjection * aPosition;");
    stage
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{GeometryConfig, GeometryKind, RaycastConfig, Variation},
        geometry::ParameterBuilder,
        raycast::{settings_for, DEFAULT_MATRIX_CAPACITY},
    };

    fn build_params(config: &GeometryConfig) -> GeometryParameterSet {
        let underlying = config
            .underlying_config()
            .map(|u| Rc::new(ParameterBuilder::build(&u, None).unwrap()));
        ParameterBuilder::build(config, underlying).unwrap()
    }

    fn embedded(face: u8, vertex: u8) -> GeometryConfig {
        GeometryConfig {
            geometry: GeometryKind::Regular { face, vertex },
            variation: Variation::Pure,
            show_3d: true,
            ..Default::default()
        }
    }

    fn native(geometry: GeometryKind) -> GeometryConfig {
        GeometryConfig {
            geometry,
            variation: Variation::Pure,
            ..Default::default()
        }
    }

    /// Generate the fragment program and return it along with the builder's
    /// scalar uniforms
    fn generate(
        config: &GeometryConfig,
        raycast: &RaycastConfig,
    ) -> (String, Vec<(&'static str, f64)>) {
        let params = build_params(config);
        let settings = settings_for(raycast, &params);
        let layout =
            WallLayout::new(&params, settings.reflect_val > 0.0).unwrap();
        let capacity = layout.matrices().len().max(DEFAULT_MATRIX_CAPACITY);
        let builder =
            RaycastShaderBuilder::new(&params, &layout, &settings, capacity);
        let program = builder.build().unwrap();
        (program.fragment, builder.uniform_values())
    }

    #[test]
    fn test_hyperbolic() {
        let (source, uniforms) =
            generate(&embedded(7, 3), &RaycastConfig::default());
        assert!(source.contains("atanh(v)"));
        assert!(source.contains("const int sides = 9;"));
        assert!(source.contains("uniform mediump mat4 uM[16];"));
        assert!(source.contains("mediump vec4 t = at0 * sinh(go);"));
        assert!(source.contains("gl_FragDepth = 1.;"));
        assert!(!source.contains("uPLevel"));
        assert!(!source.contains("depthtoset"));
        assert!(uniforms.iter().any(|(name, _)| *name == "uExpDecay"));
    }

    #[test]
    fn test_spherical() {
        let (source, _) = generate(&embedded(5, 3), &RaycastConfig::default());
        assert!(source.contains("atan(v)"));
        assert!(!source.contains("atanh"));
        assert!(source.contains("mediump vec4 t = at0 * go;"));
    }

    #[test]
    fn test_product() {
        let config = native(GeometryKind::Product {
            face: 5,
            vertex: 4,
            plevel_factor: 1.0,
            twisted: false,
        });
        let params = build_params(&config);
        let plevel = params.plevel().unwrap();
        let (source, uniforms) = generate(&config, &RaycastConfig::default());
        assert!(source.contains("uniform mediump float uPLevel;"));
        assert!(source.contains("zpos += dist * zspeed;"));
        assert!(source.contains("if(i >= sides-2) break;"));
        assert!(source.contains("if(which == sides-2) { zpos += uPLevel"));
        let (_, value) = uniforms
            .iter()
            .find(|(name, _)| *name == "uPLevel")
            .unwrap();
        assert_eq!(*value, plevel / 2.0);
    }

    #[test]
    fn test_nil() {
        let (source, _) = generate(
            &native(GeometryKind::Nil { width: 1.0 }),
            &RaycastConfig::default(),
        );
        assert!(source.contains("mediump vec4 translate("));
        assert!(source.contains("iter<600"));
        assert!(source.contains("const mediump float maxstep = 0.1;"));
        assert!(source.contains("if(rz > 0.5) which = 5;"));
        assert!(!source.contains("get_acc"));
    }

    #[test]
    fn test_solv() {
        let (source, _) =
            generate(&native(GeometryKind::Solv), &RaycastConfig::default());
        assert!(source.contains("get_acc"));
        assert!(source.contains("mediump vec4 acc4"));
        assert!(source.contains("const mediump float maxstep = 0.05;"));
        assert!(source.contains("/(6.*dist);"));
    }

    #[test]
    fn test_bitruncated() {
        let config = GeometryConfig {
            variation: Variation::Bitruncated,
            ..embedded(7, 3)
        };
        let (source, _) = generate(&config, &RaycastConfig::default());
        assert!(source.contains("uniform mediump int uWallOffset;"));
        assert!(source.contains("int walloffset, sides;"));
        assert!(source.contains("walloffset = uWallOffset; sides = uSides;"));
        assert!(source
            .contains("sides = int(connection.w * 4096.) - 16 * walloffset;"));
    }

    #[test]
    fn test_reflective() {
        let raycast = RaycastConfig {
            reflect_val: 0.5,
            ..Default::default()
        };
        let (source, _) = generate(&embedded(7, 3), &raycast);
        assert!(source.contains("tangent = uM[9+which] * tangent;"));
        assert!(source.contains("bool depthtoset = true;"));
        assert!(source.contains("if(depthtoset) gl_FragDepth = 1.;"));
        assert!(source.contains("col.w = 0.5;"));

        // Nil has nothing to reflect with
        let (nil, _) =
            generate(&native(GeometryKind::Nil { width: 1.0 }), &raycast);
        assert!(!nil.contains("depthtoset"));
    }

    #[test]
    fn test_hard_limit() {
        let raycast = RaycastConfig {
            hard_limit: Some(5.0),
            ..Default::default()
        };
        let (source, _) = generate(&embedded(7, 3), &raycast);
        assert!(source
            .contains("if(gou > 5.0) { gl_FragDepth = 1.; return; }"));
        let (unlimited, _) =
            generate(&embedded(7, 3), &RaycastConfig::default());
        assert!(!unlimited.contains("if(gou >"));
    }

    #[test]
    fn test_deterministic() {
        let config = embedded(7, 3);
        let raycast = RaycastConfig::default();
        assert_eq!(generate(&config, &raycast), generate(&config, &raycast));
    }

    #[test]
    fn test_capacity_check() {
        let params = build_params(&embedded(7, 3));
        let settings = settings_for(&RaycastConfig::default(), &params);
        let layout = WallLayout::new(&params, false).unwrap();
        let builder = RaycastShaderBuilder::new(&params, &layout, &settings, 4);
        assert!(builder.build().is_err());
    }

    #[test]
    fn test_cache() {
        let params = build_params(&embedded(7, 3));
        let settings = settings_for(&RaycastConfig::default(), &params);
        let layout = WallLayout::new(&params, false).unwrap();
        let small = RaycastShaderBuilder::new(&params, &layout, &settings, 16);
        let large = RaycastShaderBuilder::new(&params, &layout, &settings, 32);
        assert_ne!(small.key(), large.key());

        let mut cache = ShaderCache::default();
        let first = cache.get_or_build(small.key(), || small.build()).unwrap();
        let again = cache
            .get_or_build(small.key(), || panic!("should be cached"))
            .unwrap();
        assert!(Rc::ptr_eq(&first, &again));
        cache.get_or_build(large.key(), || large.build()).unwrap();
        assert_eq!(cache.len(), 2);

        // Failed builds aren't cached
        cache.clear();
        assert!(cache
            .get_or_build(small.key(), || Err(anyhow::anyhow!("broken")))
            .is_err());
        assert!(cache.is_empty());
    }
}
