//! WGSL sources for the GPU flocking pipeline.
//!
//! Each compute shader is assembled from shared snippets:
//!
//! | Shader | Pieces |
//! |--------|--------|
//! | integrate | boid, params, flock math, [`INTEGRATE_WGSL`] |
//! | bitonic | boid, [`BITONIC_WGSL`] |
//! | reindex | boid, params, [`REINDEX_WGSL`] |
//! | naive flock | boid, params, flock math, [`FLOCK_NAIVE_WGSL`] |
//! | grid flock | boid, params, flock math, [`FLOCK_GRID_WGSL`] |
//!
//! Every shader has a single `main` entry point with a workgroup size of
//! [`WORKGROUP_SIZE`](super::WORKGROUP_SIZE) and binds the boid array at
//! group 0, binding 0.

use crate::boid::BoidGpu;

/// Boid struct, matching [`BoidGpu`].
pub const BOID_WGSL: &str = BoidGpu::WGSL_STRUCT;

/// Frame-constant parameters and the grid helpers that read them.
pub const PARAMS_WGSL: &str = r#"
struct Params {
    space_low: vec3<f32>,
    boid_count: u32,
    space_high: vec3<f32>,
    range: f32,
    grid_res: vec3<u32>,
    speed_factor: f32,
    force_limit: f32,
    cell_count: u32,
};

@group(0) @binding(1) var<uniform> params: Params;

fn cell_coords(p: vec3<f32>) -> vec3<u32> {
    let res = params.grid_res;
    let size = (params.space_high - params.space_low) / vec3<f32>(res);
    let scaled = floor((p - params.space_low) / size);
    let max_coord = vec3<f32>(res - vec3<u32>(1u));
    return vec3<u32>(clamp(scaled, vec3<f32>(0.0), max_coord));
}

fn cell_index(c: vec3<u32>) -> u32 {
    let res = params.grid_res;
    return c.x + c.y * res.x + c.z * res.x * res.y;
}
"#;

/// Vector helpers and the four-rule flocking accumulator.
pub const FLOCK_MATH_WGSL: &str = r#"
const VIEW_ANGLE: f32 = 1.0;
const ANGLE_DELTA: f32 = 0.01;

fn limit_len(v: vec3<f32>, max_len: f32) -> vec3<f32> {
    if dot(v, v) > max_len * max_len {
        return normalize(v) * max_len;
    }
    return v;
}

fn angle_between(a: vec3<f32>, b: vec3<f32>) -> f32 {
    let denom = length(a) * length(b);
    if !(denom > 0.0) {
        return 0.0;
    }
    return acos(clamp(dot(a, b) / denom, -1.0, 1.0));
}

fn axis_angle(axis: vec3<f32>, ang: f32) -> mat3x3<f32> {
    let s = sin(ang);
    let c = cos(ang);
    let t = 1.0 - c;
    let x = axis.x;
    let y = axis.y;
    let z = axis.z;
    return mat3x3<f32>(
        vec3<f32>(t * x * x + c, t * x * y + s * z, t * x * z - s * y),
        vec3<f32>(t * x * y - s * z, t * y * y + c, t * y * z + s * x),
        vec3<f32>(t * x * z + s * y, t * y * z - s * x, t * z * z + c),
    );
}

fn wrap_position(p: vec3<f32>, low: vec3<f32>, high: vec3<f32>) -> vec3<f32> {
    let diag = high - low;
    var local = p - low;
    local = local - diag * floor(local / diag);
    local = select(local, vec3<f32>(0.0), local >= diag);
    let wrapped = local + low;
    return select(wrapped, low, wrapped >= high);
}

struct FlockAcc {
    align_sum: vec3<f32>,
    cohesion_sum: vec3<f32>,
    separation_sum: vec3<f32>,
    view_rot: mat3x3<f32>,
    count: u32,
    separation_count: u32,
    view_count: u32,
};

fn acc_new() -> FlockAcc {
    let identity = mat3x3<f32>(
        vec3<f32>(1.0, 0.0, 0.0),
        vec3<f32>(0.0, 1.0, 0.0),
        vec3<f32>(0.0, 0.0, 1.0),
    );
    return FlockAcc(vec3<f32>(0.0), vec3<f32>(0.0), vec3<f32>(0.0), identity, 0u, 0u, 0u);
}

fn acc_add(
    acc: ptr<function, FlockAcc>,
    me_pos: vec3<f32>,
    me_vel: vec3<f32>,
    other_pos: vec3<f32>,
    other_vel: vec3<f32>,
) {
    let away = me_pos - other_pos;
    let dist = length(away);

    (*acc).align_sum += other_vel;
    (*acc).cohesion_sum += other_pos;
    (*acc).count += 1u;

    if dist > 0.0 {
        (*acc).separation_sum += away / dist;
        (*acc).separation_count += 1u;
    }

    let towards = -away;
    let ang = angle_between(me_vel, towards);
    if ang < VIEW_ANGLE {
        let axis = cross(me_vel, towards);
        if dot(axis, axis) > 0.0 {
            (*acc).view_rot = (*acc).view_rot * axis_angle(normalize(axis), -ang * ANGLE_DELTA);
        }
        (*acc).view_count += 1u;
    }
}

fn steer_towards(desired: vec3<f32>, velocity: vec3<f32>, speed: f32, force: f32) -> vec3<f32> {
    if !(dot(desired, desired) > 0.0) {
        return vec3<f32>(0.0);
    }
    return limit_len(normalize(desired) * speed - velocity, force);
}

fn acc_steer(
    acc: FlockAcc,
    me_pos: vec3<f32>,
    me_vel: vec3<f32>,
    speed: f32,
    force: f32,
) -> vec3<f32> {
    var total = vec3<f32>(0.0);
    if acc.count > 0u {
        let n = f32(acc.count);
        total += steer_towards(acc.align_sum / n, me_vel, speed, force);
        total += steer_towards(acc.cohesion_sum / n - me_pos, me_vel, speed, force);
    }
    if acc.separation_count > 0u {
        let away = acc.separation_sum / f32(acc.separation_count);
        total += steer_towards(away, me_vel, speed, force);
    }
    if acc.view_count > 0u {
        total += steer_towards(acc.view_rot * me_vel, me_vel, speed, force);
    }
    return total;
}
"#;

/// Move every boid and record the cell it lands in.
pub const INTEGRATE_WGSL: &str = r#"
@group(0) @binding(0) var<storage, read_write> boids: array<Boid>;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let i = global_id.x;
    if i >= params.boid_count {
        return;
    }

    var b = boids[i];
    b.position = wrap_position(b.position + b.velocity, params.space_low, params.space_high);
    b.velocity += b.acceleration;
    b.acceleration = vec3<f32>(0.0);
    b.cell = cell_index(cell_coords(b.position));
    boids[i] = b;
}
"#;

/// One `(k, j)` compare/exchange sub-pass of the bitonic network.
pub const BITONIC_WGSL: &str = r#"
struct SortStage {
    k: u32,
    j: u32,
    count: u32,
    _pad: u32,
};

@group(0) @binding(0) var<storage, read_write> boids: array<Boid>;
@group(0) @binding(1) var<uniform> sort_stage: SortStage;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let i = global_id.x;
    if i >= sort_stage.count {
        return;
    }
    let l = i ^ sort_stage.j;
    if l <= i {
        return;
    }

    let a = boids[i];
    let b = boids[l];
    let ascending = (i & sort_stage.k) == 0u;
    if (ascending && a.cell > b.cell) || (!ascending && a.cell < b.cell) {
        boids[i] = b;
        boids[l] = a;
    }
}
"#;

/// Boundary scan over the sorted boids filling `cell_count + 1` offsets.
pub const REINDEX_WGSL: &str = r#"
@group(0) @binding(0) var<storage, read> boids: array<Boid>;
@group(0) @binding(2) var<storage, read_write> offsets: array<u32>;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let i = global_id.x;
    let n = params.boid_count;
    if i >= n {
        return;
    }

    let cell = boids[i].cell;
    var first = 0u;
    if i > 0u {
        first = boids[i - 1u].cell + 1u;
    }
    for (var c = first; c <= cell; c += 1u) {
        offsets[c] = i;
    }

    if i == n - 1u {
        for (var c = cell + 1u; c <= params.cell_count; c += 1u) {
            offsets[c] = n;
        }
    }
}
"#;

/// Brute-force flocking over the whole population.
pub const FLOCK_NAIVE_WGSL: &str = r#"
@group(0) @binding(0) var<storage, read_write> boids: array<Boid>;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let i = global_id.x;
    if i >= params.boid_count {
        return;
    }

    let me_pos = boids[i].position;
    let me_vel = boids[i].velocity;
    let me_id = boids[i].id;
    let range_sqr = params.range * params.range;

    var acc = acc_new();
    for (var j = 0u; j < params.boid_count; j += 1u) {
        if boids[j].id == me_id {
            continue;
        }
        let other_pos = boids[j].position;
        let d = me_pos - other_pos;
        if dot(d, d) > range_sqr {
            continue;
        }
        acc_add(&acc, me_pos, me_vel, other_pos, boids[j].velocity);
    }

    boids[i].acceleration +=
        acc_steer(acc, me_pos, me_vel, params.speed_factor, params.force_limit);
    boids[i].count_around = f32(acc.count);
}
"#;

/// Flocking over the 27 cells around each boid.
///
/// Axes with fewer than three cells visit each distinct cell once.
pub const FLOCK_GRID_WGSL: &str = r#"
@group(0) @binding(0) var<storage, read_write> boids: array<Boid>;
@group(0) @binding(2) var<storage, read> offsets: array<u32>;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let i = global_id.x;
    if i >= params.boid_count {
        return;
    }

    let me_pos = boids[i].position;
    let me_vel = boids[i].velocity;
    let me_id = boids[i].id;
    let range_sqr = params.range * params.range;

    let res = params.grid_res;
    let home = cell_coords(me_pos);
    let span = min(res, vec3<u32>(3u));
    let back = select(vec3<u32>(0u), vec3<u32>(1u), span == vec3<u32>(3u));

    var acc = acc_new();
    for (var dz = 0u; dz < span.z; dz += 1u) {
        let z = (home.z + res.z + dz - back.z) % res.z;
        for (var dy = 0u; dy < span.y; dy += 1u) {
            let y = (home.y + res.y + dy - back.y) % res.y;
            for (var dx = 0u; dx < span.x; dx += 1u) {
                let x = (home.x + res.x + dx - back.x) % res.x;
                let cell = cell_index(vec3<u32>(x, y, z));

                let end = offsets[cell + 1u];
                for (var j = offsets[cell]; j < end; j += 1u) {
                    if boids[j].id == me_id {
                        continue;
                    }
                    let other_pos = boids[j].position;
                    let d = me_pos - other_pos;
                    if dot(d, d) > range_sqr {
                        continue;
                    }
                    acc_add(&acc, me_pos, me_vel, other_pos, boids[j].velocity);
                }
            }
        }
    }

    boids[i].acceleration +=
        acc_steer(acc, me_pos, me_vel, params.speed_factor, params.force_limit);
    boids[i].count_around = f32(acc.count);
}
"#;

pub fn integrate_shader() -> String {
    [BOID_WGSL, PARAMS_WGSL, FLOCK_MATH_WGSL, INTEGRATE_WGSL].concat()
}

pub fn bitonic_shader() -> String {
    [BOID_WGSL, BITONIC_WGSL].concat()
}

pub fn reindex_shader() -> String {
    [BOID_WGSL, PARAMS_WGSL, REINDEX_WGSL].concat()
}

pub fn flock_naive_shader() -> String {
    [BOID_WGSL, PARAMS_WGSL, FLOCK_MATH_WGSL, FLOCK_NAIVE_WGSL].concat()
}

pub fn flock_grid_shader() -> String {
    [BOID_WGSL, PARAMS_WGSL, FLOCK_MATH_WGSL, FLOCK_GRID_WGSL].concat()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Validates WGSL code using naga.
    fn validate_wgsl(code: &str) -> Result<naga::Module, String> {
        let module = naga::front::wgsl::parse_str(code)
            .map_err(|e| format!("WGSL parse error: {:?}", e))?;

        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        validator
            .validate(&module)
            .map_err(|e| format!("WGSL validation error: {:?}", e))?;

        Ok(module)
    }

    fn boid_struct_size(module: &naga::Module) -> u32 {
        let (_, ty) = module
            .types
            .iter()
            .find(|(_, ty)| ty.name.as_deref() == Some("Boid"))
            .expect("Boid struct should be declared");
        match ty.inner {
            naga::TypeInner::Struct { span, .. } => span,
            _ => panic!("Boid should be a struct"),
        }
    }

    #[test]
    fn test_integrate_wgsl() {
        let module = validate_wgsl(&integrate_shader()).expect("integrate WGSL should be valid");
        assert_eq!(boid_struct_size(&module) as usize, std::mem::size_of::<BoidGpu>());
    }

    #[test]
    fn test_bitonic_wgsl() {
        validate_wgsl(&bitonic_shader()).expect("bitonic WGSL should be valid");
    }

    #[test]
    fn test_reindex_wgsl() {
        validate_wgsl(&reindex_shader()).expect("reindex WGSL should be valid");
    }

    #[test]
    fn test_flock_naive_wgsl() {
        validate_wgsl(&flock_naive_shader()).expect("naive flock WGSL should be valid");
    }

    #[test]
    fn test_flock_grid_wgsl() {
        validate_wgsl(&flock_grid_shader()).expect("grid flock WGSL should be valid");
    }

    #[test]
    fn test_params_layout_matches() {
        let module = validate_wgsl(&reindex_shader()).unwrap();
        let (_, ty) = module
            .types
            .iter()
            .find(|(_, ty)| ty.name.as_deref() == Some("Params"))
            .unwrap();
        match ty.inner {
            naga::TypeInner::Struct { span, .. } => {
                let uniforms = std::mem::size_of::<crate::gpu::flock_gpu::FlockUniforms>();
                assert_eq!(span as usize, uniforms);
            }
            _ => panic!("Params should be a struct"),
        }
    }
}
