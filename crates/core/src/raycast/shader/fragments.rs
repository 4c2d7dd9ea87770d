//! The family-specific pieces of the raycaster program. Each function here
//! answers one question ("how far is the next wall", "how does a ray move")
//! for one class of space; [super::RaycastShaderBuilder] decides which pieces
//! a program gets and glues them together.

use super::ast::{Block, Function};
use crate::{geometry::GeometryFamily, math::Curvature};

/// Render a float as a GLSL literal
pub fn glsl(value: f64) -> String {
    format!("{:?}", value)
}

/// The wall matrix of side `i` of the current cell
pub fn wall(i: &str) -> String {
    format!("uM[walloffset+{}]", i)
}

/// `xpush` as a GLSL function, for the families whose walls are tested in
/// a pushed frame
pub fn xpush(curv: Curvature) -> Option<Function> {
    let body = match curv {
        Curvature::Hyperbolic => {
            "return mat4(cosh(x), 0., 0., sinh(x), 0., 1., 0., 0., \
             0., 0., 1., 0., sinh(x), 0., 0., cosh(x));"
        }
        Curvature::Spherical => {
            "return mat4(cos(x), 0., 0., sin(x), 0., 1., 0., 0., \
             0., 0., 1., 0., -sin(x), 0., 0., cos(x));"
        }
        Curvature::Euclidean => return None,
    };
    let mut block = Block::new();
    block.line(body);
    Some(Function::new("mediump mat4 xpush(mediump float x)", block))
}

/// `len(p)` grows with the distance of `p` from the cell center. Step-based
/// integration picks the wall to cross by comparing it between the cell and
/// its neighbors.
pub fn len(family: GeometryFamily) -> Function {
    let body = match family {
        GeometryFamily::Hyperbolic | GeometryFamily::BinaryTiling => {
            "return x[3];"
        }
        GeometryFamily::Spherical => "return 1.-x[3];",
        GeometryFamily::Product(curv) | GeometryFamily::RotationSpace(curv) => {
            match curv {
                Curvature::Hyperbolic => "return x[2];",
                Curvature::Spherical => "return 1.-x[2];",
                Curvature::Euclidean => "return length(x.xy);",
            }
        }
        _ => "return length(x.xyz);",
    };
    let mut block = Block::new();
    block.line(body);
    Function::new("mediump float len(mediump vec4 x)", block)
}

/// Distance `d` along the ray to the wall given by the matrix expression
/// `m`, or `continue` when the ray misses it. On product spaces `d` is
/// scaled by the horizontal speed, so it is always a distance along the
/// full ray.
pub fn wall_distance(family: GeometryFamily, m: &str) -> Block {
    let mut block = Block::new();
    match family {
        GeometryFamily::Hyperbolic | GeometryFamily::BinaryTiling => {
            block
                .line(format!(
                    "mediump float v = ((position - {m} * position)[3] \
                     / ({m} * tangent - tangent)[3]);",
                    m = m
                ))
                .line("if(v > 1. || v < -1.) continue;")
                .line("mediump float d = atanh(v);")
                .line(
                    "mediump vec4 next_tangent = position * sinh(d) \
                     + tangent * cosh(d);",
                )
                .line(format!(
                    "if(next_tangent[3] < ({} * next_tangent)[3]) continue;",
                    m
                ));
        }
        GeometryFamily::Spherical => {
            block
                .line(format!(
                    "mediump float v = ((position - {m} * position)[3] \
                     / ({m} * tangent - tangent)[3]);",
                    m = m
                ))
                .line("mediump float d = atan(v);")
                .line(
                    "mediump vec4 next_tangent = -position * sin(d) \
                     + tangent * cos(d);",
                )
                .line(format!(
                    "if(next_tangent[3] > ({} * next_tangent)[3]) continue;",
                    m
                ));
        }
        GeometryFamily::Product(Curvature::Hyperbolic) => {
            block
                .line(format!(
                    "mediump float v = ((position - {m} * position)[2] \
                     / ({m} * tangent - tangent)[2]);",
                    m = m
                ))
                .line("if(v > 1. || v < -1.) continue;")
                .line("mediump float d = atanh(v);")
                .line(
                    "mediump vec4 next_tangent = position * sinh(d) \
                     + tangent * cosh(d);",
                )
                .line(format!(
                    "if(next_tangent[2] < ({} * next_tangent)[2]) continue;",
                    m
                ))
                .line("d /= xspeed;");
        }
        GeometryFamily::Product(Curvature::Spherical) => {
            block
                .line(format!(
                    "mediump float v = ((position - {m} * position)[2] \
                     / ({m} * tangent - tangent)[2]);",
                    m = m
                ))
                .line("mediump float d = atan(v);")
                .line(
                    "mediump vec4 next_tangent = tangent * cos(d) \
                     - position * sin(d);",
                )
                .line(format!(
                    "if(next_tangent[2] > ({} * next_tangent)[2]) continue;",
                    m
                ))
                .line("d /= xspeed;");
        }
        _ => {
            block.append(euclidean_wall_distance(m));
            if family.is_hybrid() {
                block.line("d /= xspeed;");
            }
        }
    }
    block
}

fn euclidean_wall_distance(m: &str) -> Block {
    let mut block = Block::new();
    block
        .line(format!(
            "mediump float deno = dot(position, tangent) \
             - dot({m}*position, {m}*tangent);",
            m = m
        ))
        .line("if(deno < 1e-6 && deno > -1e-6) continue;")
        .line(format!(
            "mediump float d = (dot({m}*position, {m}*position) \
             - dot(position, position)) / 2. / deno;",
            m = m
        ))
        .line("if(d < 0.) continue;")
        .line("mediump vec4 next_position = position + d * tangent;")
        .line(format!(
            "if(dot(next_position, tangent) \
             < dot({m}*next_position, {m}*tangent)) continue;",
            m = m
        ));
    block
}

/// Intersections with the horocycles bounding a binary tiling cell: 20 is
/// the one at `+uBLevel` (towards the parents), 21 the one at `-uBLevel`
pub fn horocycle_walls() -> Block {
    let mut body = Block::new();
    body.lines(vec![
        "mediump float sgn = i == 20 ? -1. : 1.;",
        "mediump vec4 zpos = xpush(uBLevel*sgn) * position;",
        "mediump vec4 ztan = xpush(uBLevel*sgn) * tangent;",
        "mediump float Mp = zpos.w - zpos.x;",
        "mediump float Mt = ztan.w - ztan.x;",
        "mediump float a = (Mp*Mp-Mt*Mt);",
        "mediump float b = Mp/a;",
        "mediump float c = (1.+Mt*Mt) / a;",
        "if(b*b < c) continue;",
        "if(sgn < 0. && Mt > 0.) continue;",
        "mediump float zsgn = (Mt > 0. ? -sgn : sgn);",
        "mediump float u = sqrt(b*b-c)*zsgn + b;",
        "mediump float v = -(Mp*u-1.) / Mt;",
        "mediump float d = asinh(v);",
        "if(d < 0. && abs(log(position.w*position.w-position.x*position.x)) \
         < uBLevel) continue;",
        "if(d < dist) { dist = d; which = i; }",
    ]);
    let mut block = Block::new();
    block.for_loop("int i=20; i<22; i++", body);
    block
}

/// After hitting horocycle 20 or 21, pick which of the cells beyond it the
/// ray entered
pub fn resolve_horocycle(up: &[usize], down: &[usize]) -> Block {
    let nearest = |dirs: &[usize]| {
        let mut block = Block::new();
        block.line("mediump float best = 999.;");
        for dir in dirs {
            block.line(format!(
                "if(len(uM[{d}] * position) < best) \
                 {{ best = len(uM[{d}] * position); which = {d}; }}",
                d = dir
            ));
        }
        block
    };
    let mut block = Block::new();
    block
        .if_then("which == 20", nearest(up))
        .if_then("which == 21", nearest(down));
    block
}

/// The fiber walls of a product cell. `zpos` is kept within
/// `[-uPLevel, uPLevel]`, crossing moves it by a full level.
pub fn fiber_walls() -> Block {
    let mut block = Block::new();
    block
        .line(
            "if(zspeed > 0.) { mediump float d = (uPLevel - zpos) / zspeed; \
             if(d < dist) { dist = d; which = sides-1; }}",
        )
        .line(
            "if(zspeed < 0.) { mediump float d = (-uPLevel - zpos) / zspeed; \
             if(d < dist) { dist = d; which = sides-2; }}",
        );
    block
}

/// Move `dist` along the ray, in closed form
pub fn advance(family: GeometryFamily) -> Block {
    let mut block = Block::new();
    match family {
        GeometryFamily::Hyperbolic | GeometryFamily::BinaryTiling => {
            block.lines(vec![
                "mediump float ch = cosh(dist); mediump float sh = sinh(dist);",
                "mediump vec4 v = position * ch + tangent * sh;",
                "tangent = tangent * ch + position * sh;",
                "position = v;",
            ]);
        }
        GeometryFamily::Spherical => {
            block.lines(vec![
                "mediump float ch = cos(dist); mediump float sh = sin(dist);",
                "mediump vec4 v = position * ch + tangent * sh;",
                "tangent = tangent * ch - position * sh;",
                "position = v;",
            ]);
        }
        GeometryFamily::Product(Curvature::Hyperbolic) => {
            block.lines(vec![
                "mediump float ch = cosh(dist*xspeed); \
                 mediump float sh = sinh(dist*xspeed);",
                "mediump vec4 v = position * ch + tangent * sh;",
                "tangent = tangent * ch + position * sh;",
                "position = v;",
                "zpos += dist * zspeed;",
            ]);
        }
        GeometryFamily::Product(Curvature::Spherical) => {
            block.lines(vec![
                "mediump float ch = cos(dist*xspeed); \
                 mediump float sh = sin(dist*xspeed);",
                "mediump vec4 v = position * ch + tangent * sh;",
                "tangent = tangent * ch - position * sh;",
                "position = v;",
                "zpos += dist * zspeed;",
            ]);
        }
        GeometryFamily::Product(Curvature::Euclidean) => {
            block.lines(vec![
                "position = position + tangent * dist * xspeed;",
                "zpos += dist * zspeed;",
            ]);
        }
        _ => {
            block.line("position = position + tangent * dist;");
        }
    }
    block
}

/// Pull position and tangent back onto the hyperboloid, against drift
pub fn renormalize(family: GeometryFamily) -> Block {
    let mut block = Block::new();
    match family {
        GeometryFamily::Hyperbolic | GeometryFamily::BinaryTiling => {
            block.lines(vec![
                "position /= sqrt(position.w*position.w \
                 - dot(position.xyz, position.xyz));",
                "tangent -= dot(vec4(-position.xyz, position.w), tangent) \
                 * position;",
                "tangent /= sqrt(dot(tangent.xyz, tangent.xyz) \
                 - tangent.w*tangent.w);",
            ]);
        }
        GeometryFamily::Product(Curvature::Hyperbolic)
        | GeometryFamily::RotationSpace(Curvature::Hyperbolic) => {
            // Vertical rays have no tangent to normalize
            let mut tangent = Block::new();
            tangent.lines(vec![
                "tangent -= dot(vec3(-position.xy, position.z), tangent.xyz) \
                 * position;",
                "tangent /= sqrt(dot(tangent.xy, tangent.xy) \
                 - tangent.z*tangent.z);",
            ]);
            block
                .line(
                    "position /= sqrt(position.z*position.z \
                     - dot(position.xy, position.xy));",
                )
                .if_then("xspeed > 0.", tangent);
        }
        _ => {}
    }
    block
}

/// Geodesic acceleration for the Runge-Kutta integrator. Nil uses its
/// closed-form geodesics instead and only needs the Christoffel symbols for
/// nearly horizontal rays.
pub fn acceleration(family: GeometryFamily) -> Vec<Function> {
    let mut christoffel = Block::new();
    match family {
        GeometryFamily::Solv => {
            christoffel.line(
                "return vec4(-vel.z*tra.x - vel.x*tra.z, \
                 vel.z*tra.y + vel.y*tra.z, \
                 vel.x*tra.x*exp(2.*pos.z) - vel.y*tra.y*exp(-2.*pos.z), 0.);",
            );
        }
        GeometryFamily::Nil => {
            christoffel.lines(vec![
                "mediump float x = pos.x;",
                "return vec4(x*vel.y*tra.y - 0.5*dot(vel.yz,tra.zy), \
                 -.5*x*dot(vel.yx,tra.xy) + .5*dot(vel.zx,tra.xz), \
                 -.5*(x*x-1.)*dot(vel.yx,tra.xy) + .5*x*dot(vel.zx,tra.xz), \
                 0.);",
            ]);
        }
        GeometryFamily::RotationSpace(curv) => {
            // Geodesics of the base surface; the fiber drift is added
            // separately
            christoffel.line(match curv {
                Curvature::Hyperbolic => {
                    "return vec4(pos.xyz * (dot(vel.xy, tra.xy) \
                     - vel.z*tra.z), 0.);"
                }
                Curvature::Spherical => {
                    "return vec4(-pos.xyz * dot(vel.xyz, tra.xyz), 0.);"
                }
                Curvature::Euclidean => "return vec4(0.);",
            });
        }
        _ => return Vec::new(),
    }

    let mut functions = vec![Function::new(
        "mediump vec4 christoffel(mediump vec4 pos, mediump vec4 vel, \
         mediump vec4 tra)",
        christoffel,
    )];
    if family != GeometryFamily::Nil {
        let mut acc = Block::new();
        acc.line("return christoffel(pos, vel, vel);");
        functions.push(Function::new(
            "mediump vec4 get_acc(mediump vec4 pos, mediump vec4 vel)",
            acc,
        ));
    }
    functions
}

/// Left translations of Nil
pub fn nil_translations() -> Vec<Function> {
    let function = |signature: &str, body: &str| {
        let mut block = Block::new();
        block.line(body);
        Function::new(signature, block)
    };
    vec![
        function(
            "mediump vec4 translate(mediump vec4 a, mediump vec4 b)",
            "return vec4(a[0] + b[0], a[1] + b[1], a[2] + b[2] + a[0] * b[1], \
             b[3]);",
        ),
        function(
            "mediump vec4 translatev(mediump vec4 a, mediump vec4 t)",
            "return vec4(t[0], t[1], t[2] + a[0] * t[1], 0.);",
        ),
        function(
            "mediump vec4 itranslatev(mediump vec4 a, mediump vec4 t)",
            "return vec4(t[0], t[1], t[2] - a[0] * t[1], 0.);",
        ),
    ]
}

/// One Runge-Kutta step of length `dist`, into `nposition`
pub fn runge_kutta(family: GeometryFamily) -> Block {
    let mut block = Block::new();
    let vel = if family.is_hybrid() {
        "mediump vec4 vel = tangent * dist * xspeed;"
    } else {
        "mediump vec4 vel = tangent * dist;"
    };
    block.line(vel).lines(vec![
        "mediump vec4 acc1 = get_acc(position, vel);",
        "mediump vec4 acc2 = get_acc(position + vel / 2., vel + acc1/2.);",
        "mediump vec4 acc3 = get_acc(position + vel / 2. + acc1/4., \
         vel + acc2/2.);",
        "mediump vec4 acc4 = get_acc(position + vel + acc2/2., vel + acc3/2.);",
        "mediump vec4 nposition = position + vel + (acc1+acc2+acc3)/6.;",
    ]);
    if family.is_hybrid() {
        block.line(
            "mediump float nzpos = zpos + dist * zspeed \
             + .5 * (position.x*vel.y - position.y*vel.x);",
        );
    }
    block
}

/// A step of length `dist` along a Nil geodesic, in closed form. Nearly
/// horizontal rays use the midpoint method, the closed form loses too much
/// precision there.
pub fn nil_step() -> Block {
    let mut vertical = Block::new();
    vertical.lines(vec!["xp = vec4(0., 0., back.z*dist, 1.);", "xt = back;"]);
    let mut horizontal = Block::new();
    horizontal.lines(vec![
        "xp = vec4(back.x*dist, back.y*dist, back.x*back.y*dist*dist/2., 1.);",
        "xt = vec4(back.x, back.y, dist*back.x*back.y, 0.);",
    ]);
    let mut shallow = Block::new();
    shallow.lines(vec![
        "mediump vec4 acc = christoffel(vec4(0,0,0,1), back, back);",
        "mediump vec4 pos2 = back * dist / 2.;",
        "mediump vec4 tan2 = back + acc * dist / 2.;",
        "mediump vec4 acc2 = christoffel(pos2, tan2, tan2);",
        "xp = vec4(0,0,0,1) + back * dist + acc2 / 2. * dist * dist;",
        "xt = back + acc * dist;",
    ]);
    let mut helix = Block::new();
    helix.lines(vec![
        "mediump float alpha = atan(back.y, back.x);",
        "mediump float w = back.z * dist;",
        "mediump float c = length(back.xy) / back.z;",
        "xp = vec4(2.*c*sin(w/2.) * cos(w/2.+alpha), \
         2.*c*sin(w/2.)*sin(w/2.+alpha), \
         w*(1.+(c*c/2.)*((1.-sin(w)/w)+(1.-cos(w))/w * sin(w+2.*alpha))), 1.);",
        "xt = back.z * vec4(c*cos(alpha+w), c*sin(alpha+w), \
         1. + c*c*2.*sin(w/2.)*sin(alpha+w)*cos(alpha+w/2.), 0.);",
    ]);

    let mut not_shallow = Block::new();
    not_shallow.if_else("abs(back.z) < 1e-1", shallow, helix);
    let mut not_horizontal = Block::new();
    not_horizontal.if_else("abs(back.z) == 0.", horizontal, not_shallow);

    let mut block = Block::new();
    block
        .line("mediump vec4 xp, xt;")
        .line("mediump vec4 back = itranslatev(position, tangent);")
        .if_else("back.x == 0. && back.y == 0.", vertical, not_horizontal)
        .line("mediump vec4 nposition = translate(position, xp);");
    block
}

/// Condition under which a step-based ray has left its cell
pub fn outside(
    family: GeometryFamily,
    half_width: f64,
    half_height: f64,
) -> String {
    match family {
        GeometryFamily::Nil => format!(
            "abs(nposition.x) > {w} || abs(nposition.y) > {w} \
             || abs(rz) > {h}",
            w = glsl(half_width),
            h = glsl(half_height),
        ),
        GeometryFamily::Solv => format!(
            "abs(nposition.x) > {w} || abs(nposition.y) > {w} \
             || abs(nposition.z) > {h}",
            w = glsl(half_width),
            h = glsl(half_height),
        ),
        _ => "which != -1".into(),
    }
}

/// After a step-based ray has left its cell, pick the side it went through
pub fn exit_side(
    family: GeometryFamily,
    half_width: f64,
    half_height: f64,
) -> Block {
    let w = glsl(half_width);
    let h = glsl(half_height);
    let mut block = Block::new();
    match family {
        GeometryFamily::Nil => {
            block
                .line(format!("if(nposition.x > {}) which = 3;", w))
                .line(format!("if(nposition.x < -{}) which = 0;", w))
                .line(format!("if(nposition.y > {}) which = 4;", w))
                .line(format!("if(nposition.y < -{}) which = 1;", w))
                .line(format!("if(rz > {}) which = 5;", h))
                .line(format!("if(rz < -{}) which = 2;", h));
        }
        GeometryFamily::Solv => {
            // Cells above are half as wide in x, cells below half as wide
            // in y
            let quarter = glsl(half_width / 2.0);
            block
                .line(format!("if(nposition.x > {}) which = 0;", w))
                .line(format!("if(nposition.x < -{}) which = 2;", w))
                .line(format!("if(nposition.y > {}) which = 1;", w))
                .line(format!("if(nposition.y < -{}) which = 3;", w))
                .line(format!(
                    "if(nposition.z > {}) which = nposition.x > {} ? 5 : 4;",
                    h, quarter
                ))
                .line(format!(
                    "if(nposition.z < -{}) which = nposition.y > {} ? 7 : 6;",
                    h, quarter
                ));
        }
        _ => {}
    }
    block
}

/// Nearest neighbor by `len`, for step-based product-like spaces, followed
/// by the fiber check
pub fn nearest_wall() -> Block {
    let mut body = Block::new();
    body.line(format!(
        "mediump float cand = len({} * nposition);",
        wall("i")
    ))
    .line("if(cand < best) { best = cand; which = i; }");
    let mut block = Block::new();
    block
        .line("mediump float best = len(nposition);")
        .for_loop("int i=0; i<sides-2; i++", body)
        .line("if(nzpos > uPLevel) which = sides-1;")
        .line("if(nzpos < -uPLevel) which = sides-2;");
    block
}

/// Fog mixed into a wall color at distance `gou`
pub fn fog(volumetric: bool) -> Block {
    let mut block = Block::new();
    if !volumetric {
        block
            .line(
                "mediump float d = max(1. - gou / uLinearSightRange, \
                 uExpStart * exp(-gou / uExpDecay));",
            )
            .line("col.xyz = col.xyz * d + uFogColor.xyz * (1.-d);");
    }
    block
}

/// Absorption by the fog inside the current cell
pub fn volumetric(hard_limit: f64) -> Block {
    let limit = glsl(hard_limit);
    let mut body = Block::new();
    body.line(format!("if(dist > {l} - go) dist = {l} - go;", l = limit))
        .lines(vec![
            "mediump vec4 col = texture2D(tVolumetric, cid);",
            "mediump float factor = col.w; col.w = 1.;",
            "mediump float frac = exp(-(factor + 1. / uExpDecay) * dist);",
            "gl_FragColor += left * (1.-frac) * col;",
            "left *= frac;",
        ]);
    let mut block = Block::new();
    block.if_then(format!("dist > 0. && go < {}", limit), body);
    block
}

/// How a reflective wall turns the ray around
pub fn reflect(
    family: GeometryFamily,
    reflection_offset: Option<usize>,
    horocycle_sides: &[usize],
) -> Block {
    let mut block = Block::new();
    if family.is_hybrid() {
        block.line(
            "if(reflect && which >= sides-2) { zspeed = -zspeed; continue; }",
        );
    }
    match family {
        GeometryFamily::Solv => {
            let mut flip = Block::new();
            flip.line("if(which == 0 || which == 2) tangent.x = -tangent.x;")
                .line(
                    "else if(which == 1 || which == 3) tangent.y = -tangent.y;",
                )
                .line("else tangent.z = -tangent.z;")
                .line("continue;");
            block.if_then("reflect", flip);
        }
        _ => {
            if family == GeometryFamily::BinaryTiling {
                let condition = horocycle_sides
                    .iter()
                    .map(|side| format!("which == {}", side))
                    .collect::<Vec<_>>()
                    .join(" || ");
                let mut horo = Block::new();
                horo.lines(vec![
                    "mediump float x = -log(position.w - position.x);",
                    "mediump vec4 xtan = xpush(-x) * tangent;",
                    "mediump float diag = (position.y*position.y\
                     +position.z*position.z)/2.;",
                    "mediump vec4 normal = vec4(1.-diag, -position.y, \
                     -position.z, -diag);",
                    "mediump float mdot = dot(xtan.xyz, normal.xyz) \
                     - xtan.w * normal.w;",
                    "xtan = xtan - normal * mdot * 2.;",
                    "tangent = xpush(x) * xtan;",
                    "continue;",
                ]);
                block.if_then(format!("reflect && ({})", condition), horo);
            }
            if let Some(offset) = reflection_offset {
                let mut mirror = Block::new();
                mirror
                    .line(format!("tangent = uM[{}+which] * tangent;", offset))
                    .line("continue;");
                block.if_then("reflect", mirror);
            }
        }
    }
    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raycast::shader::ast::Stage;

    fn render(block: Block) -> String {
        let mut stage = Stage::default();
        stage.main = block;
        stage.render()
    }

    #[test]
    fn test_glsl_literals() {
        assert_eq!(glsl(1.0), "1.0");
        assert_eq!(glsl(0.05), "0.05");
        assert_eq!(glsl(999999.0), "999999.0");
    }

    #[test]
    fn test_wall_distance_per_family() {
        let hyperbolic =
            render(wall_distance(GeometryFamily::Hyperbolic, &wall("i")));
        assert!(hyperbolic.contains("atanh(v)"));
        assert!(hyperbolic.contains("uM[walloffset+i]"));
        assert!(!hyperbolic.contains("xspeed"));

        let spherical =
            render(wall_distance(GeometryFamily::Spherical, "uM[i]"));
        assert!(spherical.contains("atan(v)"));
        assert!(!spherical.contains("atanh"));

        let flat = render(wall_distance(GeometryFamily::Euclidean, "uM[i]"));
        assert!(flat.contains("deno"));

        let product = render(wall_distance(
            GeometryFamily::Product(Curvature::Hyperbolic),
            "uM[i]",
        ));
        assert!(product.contains("[2]"));
        assert!(product.contains("d /= xspeed;"));

        let flat_product = render(wall_distance(
            GeometryFamily::Product(Curvature::Euclidean),
            "uM[i]",
        ));
        assert!(flat_product.contains("deno"));
        assert!(flat_product.contains("d /= xspeed;"));
    }

    #[test]
    fn test_acceleration() {
        assert!(acceleration(GeometryFamily::Hyperbolic).is_empty());
        // Nil only needs the symbols, not the RK4 acceleration
        let nil = acceleration(GeometryFamily::Nil);
        assert_eq!(nil.len(), 1);
        let solv = acceleration(GeometryFamily::Solv);
        assert_eq!(solv.len(), 2);
        assert!(solv[1].signature.contains("get_acc"));
    }

    #[test]
    fn test_reflect() {
        let mirror =
            render(reflect(GeometryFamily::Hyperbolic, Some(14), &[]));
        assert!(mirror.contains("tangent = uM[14+which] * tangent;"));
        let product = render(reflect(
            GeometryFamily::Product(Curvature::Spherical),
            Some(9),
            &[],
        ));
        assert!(product.contains("zspeed = -zspeed"));
        let solv = render(reflect(GeometryFamily::Solv, None, &[]));
        assert!(solv.contains("tangent.z = -tangent.z;"));
        assert!(!solv.contains("uM["));
    }
}
