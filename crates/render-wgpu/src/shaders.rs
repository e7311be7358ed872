/// Main pass: Blinn-Phong lighting with shadow maps. Holds the standard
/// entry points and the displaced ones used for patched objects.
pub const SCENE_SHADER: &str = r#"
struct Light {
    // xyz position, w range
    position: vec4<f32>,
    // xyz direction, w cos(cutoff)
    direction: vec4<f32>,
    radiance: vec4<f32>,
    // x enabled, y bias, z near, w far
    shadow: vec4<f32>,
    view_proj: mat4x4<f32>,
};

struct Frame {
    view_proj: mat4x4<f32>,
    eye: vec4<f32>,
    ambient: vec4<f32>,
    counts: vec4<u32>,
    lights: array<Light, 7>,
};

struct Object {
    model: mat4x4<f32>,
    // x lit, y receives shadows, z displacement scale
    params: vec4<f32>,
};

struct Material {
    kd: vec4<f32>,
    ks: vec4<f32>,
    ke: vec4<f32>,
};

@group(0) @binding(0) var<uniform> frame: Frame;
@group(0) @binding(1) var shadow_sampler: sampler_comparison;
@group(0) @binding(2) var directional_shadow: texture_depth_2d;
@group(0) @binding(3) var spot_shadow_0: texture_depth_2d;
@group(0) @binding(4) var spot_shadow_1: texture_depth_2d;
@group(0) @binding(5) var point_shadow_0: texture_depth_cube;
@group(0) @binding(6) var point_shadow_1: texture_depth_cube;
@group(0) @binding(7) var point_shadow_2: texture_depth_cube;
@group(0) @binding(8) var point_shadow_3: texture_depth_cube;

@group(1) @binding(0) var<uniform> object: Object;

@group(2) @binding(0) var<uniform> material: Material;
@group(2) @binding(1) var diffuse_map: texture_2d<f32>;
@group(2) @binding(2) var material_sampler: sampler;

@group(3) @binding(0) var normal_map: texture_2d<f32>;
@group(3) @binding(1) var displacement_map: texture_2d<f32>;
@group(3) @binding(2) var surface_sampler: sampler;

const SPOT_FIRST: u32 = 1u;
const POINT_FIRST: u32 = 3u;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_position: vec3<f32>,
    @location(1) world_normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
};

fn to_world(position: vec3<f32>, normal: vec3<f32>, uv: vec2<f32>) -> VertexOutput {
    let world = object.model * vec4<f32>(position, 1.0);
    var out: VertexOutput;
    out.clip_position = frame.view_proj * world;
    out.world_position = world.xyz;
    out.world_normal = normalize((object.model * vec4<f32>(normal, 0.0)).xyz);
    out.uv = uv;
    return out;
}

@vertex
fn vs_main(vertex: VertexInput) -> VertexOutput {
    return to_world(vertex.position, vertex.normal, vertex.uv);
}

@vertex
fn vs_displaced(vertex: VertexInput) -> VertexOutput {
    let height = textureSampleLevel(displacement_map, surface_sampler, vertex.uv, 0.0).r;
    let moved = vertex.position + vertex.normal * height * object.params.z;
    return to_world(moved, vertex.normal, vertex.uv);
}

fn shadow_2d(map: texture_depth_2d, light: Light, position: vec3<f32>) -> f32 {
    if light.shadow.x < 0.5 {
        return 1.0;
    }
    let clip = light.view_proj * vec4<f32>(position, 1.0);
    if clip.w <= 0.0 {
        return 1.0;
    }
    let ndc = clip.xyz / clip.w;
    let uv = vec2<f32>(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5);
    if uv.x < 0.0 || uv.x > 1.0 || uv.y < 0.0 || uv.y > 1.0 || ndc.z > 1.0 {
        return 1.0;
    }
    return textureSampleCompareLevel(map, shadow_sampler, uv, ndc.z - light.shadow.y);
}

fn shadow_cube(map: texture_depth_cube, light: Light, position: vec3<f32>) -> f32 {
    if light.shadow.x < 0.5 {
        return 1.0;
    }
    let to_fragment = position - light.position.xyz;
    let a = abs(to_fragment);
    let major = max(a.x, max(a.y, a.z));
    let near = light.shadow.z;
    let far = light.shadow.w;
    if major >= far || major <= near {
        return 1.0;
    }
    let depth = far * (major - near) / (major * (far - near));
    return textureSampleCompareLevel(map, shadow_sampler, to_fragment, depth - light.shadow.y);
}

fn spot_shadow(index: u32, light: Light, position: vec3<f32>) -> f32 {
    if index == 0u {
        return shadow_2d(spot_shadow_0, light, position);
    }
    return shadow_2d(spot_shadow_1, light, position);
}

fn point_shadow(index: u32, light: Light, position: vec3<f32>) -> f32 {
    switch index {
        case 0u: { return shadow_cube(point_shadow_0, light, position); }
        case 1u: { return shadow_cube(point_shadow_1, light, position); }
        case 2u: { return shadow_cube(point_shadow_2, light, position); }
        default: { return shadow_cube(point_shadow_3, light, position); }
    }
}

fn blinn_phong(n: vec3<f32>, l: vec3<f32>, v: vec3<f32>, radiance: vec3<f32>, base: vec3<f32>) -> vec3<f32> {
    let diffuse = max(dot(n, l), 0.0);
    if diffuse <= 0.0 {
        return vec3<f32>(0.0);
    }
    let h = normalize(l + v);
    let specular = pow(max(dot(n, h), 0.0), max(material.ks.w, 1.0));
    return radiance * (base * diffuse + material.ks.rgb * specular);
}

fn range_falloff(d: f32, range: f32) -> f32 {
    let t = clamp(1.0 - d / max(range, 0.0001), 0.0, 1.0);
    return t * t;
}

fn shade(position: vec3<f32>, n: vec3<f32>, uv: vec2<f32>) -> vec4<f32> {
    var base = material.kd.rgb;
    var alpha = material.kd.a;
    if material.ke.w > 0.5 {
        let texel = textureSample(diffuse_map, material_sampler, uv);
        base = base * texel.rgb;
        alpha = alpha * texel.a;
    }
    if object.params.x < 0.5 {
        return vec4<f32>(base + material.ke.rgb, alpha);
    }

    let receives = object.params.y > 0.5;
    let v = normalize(frame.eye.xyz - position);
    var color = frame.ambient.rgb * base + material.ke.rgb;

    for (var i = 0u; i < frame.counts.x; i = i + 1u) {
        let light = frame.lights[i];
        let l = normalize(-light.direction.xyz);
        var visible = 1.0;
        if receives {
            visible = shadow_2d(directional_shadow, light, position);
        }
        color += visible * blinn_phong(n, l, v, light.radiance.rgb, base);
    }

    for (var i = 0u; i < frame.counts.y; i = i + 1u) {
        let light = frame.lights[SPOT_FIRST + i];
        let to_light = light.position.xyz - position;
        let dist = length(to_light);
        let l = to_light / max(dist, 0.0001);
        let cos_theta = dot(-l, normalize(light.direction.xyz));
        let cutoff = light.direction.w;
        if cos_theta < cutoff {
            continue;
        }
        let edge = smoothstep(cutoff, mix(cutoff, 1.0, 0.1), cos_theta);
        var visible = 1.0;
        if receives {
            visible = spot_shadow(i, light, position);
        }
        let falloff = range_falloff(dist, light.position.w);
        color += visible * edge * falloff * blinn_phong(n, l, v, light.radiance.rgb, base);
    }

    for (var i = 0u; i < frame.counts.z; i = i + 1u) {
        let light = frame.lights[POINT_FIRST + i];
        let to_light = light.position.xyz - position;
        let dist = length(to_light);
        let l = to_light / max(dist, 0.0001);
        var visible = 1.0;
        if receives {
            visible = point_shadow(i, light, position);
        }
        let falloff = range_falloff(dist, light.position.w);
        color += visible * falloff * blinn_phong(n, l, v, light.radiance.rgb, base);
    }

    return vec4<f32>(color, alpha);
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return shade(in.world_position, normalize(in.world_normal), in.uv);
}

// Tangent frame from screen-space derivatives, no tangent attribute needed.
fn perturb_normal(n: vec3<f32>, position: vec3<f32>, uv: vec2<f32>, sampled: vec3<f32>) -> vec3<f32> {
    let dp1 = dpdx(position);
    let dp2 = dpdy(position);
    let duv1 = dpdx(uv);
    let duv2 = dpdy(uv);
    let dp2perp = cross(dp2, n);
    let dp1perp = cross(n, dp1);
    let t = dp2perp * duv1.x + dp1perp * duv2.x;
    let b = dp2perp * duv1.y + dp1perp * duv2.y;
    let scale = inverseSqrt(max(max(dot(t, t), dot(b, b)), 1e-12));
    let tbn = mat3x3<f32>(t * scale, b * scale, n);
    return normalize(tbn * sampled);
}

@fragment
fn fs_displaced(in: VertexOutput) -> @location(0) vec4<f32> {
    let n = normalize(in.world_normal);
    let sampled = textureSample(normal_map, surface_sampler, in.uv).xyz * 2.0 - 1.0;
    let perturbed = perturb_normal(n, in.world_position, in.uv, sampled);
    return shade(in.world_position, perturbed, in.uv);
}
"#;

/// Geometry-only passes: shadow depth and the wireframe overlay. Group 0 is
/// a single view-projection selected by dynamic offset.
pub const GEOMETRY_SHADER: &str = r#"
struct View {
    view_proj: mat4x4<f32>,
};

struct Object {
    model: mat4x4<f32>,
    params: vec4<f32>,
};

@group(0) @binding(0) var<uniform> view: View;
@group(1) @binding(0) var<uniform> object: Object;
@group(2) @binding(1) var displacement_map: texture_2d<f32>;
@group(2) @binding(2) var surface_sampler: sampler;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
};

@vertex
fn vs_depth(vertex: VertexInput) -> @builtin(position) vec4<f32> {
    return view.view_proj * object.model * vec4<f32>(vertex.position, 1.0);
}

// Standard objects carry a zero displacement scale, so this entry point
// also serves them in the wireframe overlay.
@vertex
fn vs_depth_displaced(vertex: VertexInput) -> @builtin(position) vec4<f32> {
    let height = textureSampleLevel(displacement_map, surface_sampler, vertex.uv, 0.0).r;
    let moved = vertex.position + vertex.normal * height * object.params.z;
    return view.view_proj * object.model * vec4<f32>(moved, 1.0);
}

@fragment
fn fs_wire() -> @location(0) vec4<f32> {
    return vec4<f32>(0.1, 1.0, 0.3, 1.0);
}
"#;

/// Fullscreen skybox drawn at the far plane behind opaque geometry.
pub const SKYBOX_SHADER: &str = r#"
struct Sky {
    inv_view_proj: mat4x4<f32>,
};

@group(0) @binding(0) var<uniform> sky: Sky;
@group(0) @binding(1) var sky_map: texture_cube<f32>;
@group(0) @binding(2) var sky_sampler: sampler;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) ndc: vec2<f32>,
};

@vertex
fn vs_sky(@builtin(vertex_index) index: u32) -> VertexOutput {
    let x = f32((index << 1u) & 2u) * 2.0 - 1.0;
    let y = f32(index & 2u) * 2.0 - 1.0;
    var out: VertexOutput;
    out.clip_position = vec4<f32>(x, y, 1.0, 1.0);
    out.ndc = vec2<f32>(x, y);
    return out;
}

@fragment
fn fs_sky(in: VertexOutput) -> @location(0) vec4<f32> {
    let world = sky.inv_view_proj * vec4<f32>(in.ndc, 1.0, 1.0);
    let direction = normalize(world.xyz / world.w);
    return textureSample(sky_map, sky_sampler, direction);
}
"#;
