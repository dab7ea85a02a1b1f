//! Flag-by-flag comparison of core device features.

use ash::vk;

macro_rules! feature_fields {
    ($($field:ident),* $(,)?) => {
        /// Names of requested features the device does not support.
        pub fn missing_features(
            supported: &vk::PhysicalDeviceFeatures,
            requested: &vk::PhysicalDeviceFeatures,
        ) -> Vec<&'static str> {
            let mut missing = Vec::new();
            $(
                if requested.$field == vk::TRUE && supported.$field != vk::TRUE {
                    missing.push(stringify!($field));
                }
            )*
            missing
        }

        /// Number of enabled flags in a feature set.
        pub fn enabled_count(features: &vk::PhysicalDeviceFeatures) -> usize {
            [$(features.$field),*].iter().filter(|&&f| f == vk::TRUE).count()
        }
    };
}

feature_fields!(
    robust_buffer_access,
    full_draw_index_uint32,
    image_cube_array,
    independent_blend,
    geometry_shader,
    tessellation_shader,
    sample_rate_shading,
    dual_src_blend,
    logic_op,
    multi_draw_indirect,
    draw_indirect_first_instance,
    depth_clamp,
    depth_bias_clamp,
    fill_mode_non_solid,
    depth_bounds,
    wide_lines,
    large_points,
    alpha_to_one,
    multi_viewport,
    sampler_anisotropy,
    texture_compression_etc2,
    texture_compression_astc_ldr,
    texture_compression_bc,
    occlusion_query_precise,
    pipeline_statistics_query,
    vertex_pipeline_stores_and_atomics,
    fragment_stores_and_atomics,
    shader_tessellation_and_geometry_point_size,
    shader_image_gather_extended,
    shader_storage_image_extended_formats,
    shader_storage_image_multisample,
    shader_storage_image_read_without_format,
    shader_storage_image_write_without_format,
    shader_uniform_buffer_array_dynamic_indexing,
    shader_sampled_image_array_dynamic_indexing,
    shader_storage_buffer_array_dynamic_indexing,
    shader_storage_image_array_dynamic_indexing,
    shader_clip_distance,
    shader_cull_distance,
    shader_float64,
    shader_int64,
    shader_int16,
    shader_resource_residency,
    shader_resource_min_lod,
    sparse_binding,
    sparse_residency_buffer,
    sparse_residency_image2_d,
    sparse_residency_image3_d,
    sparse_residency2_samples,
    sparse_residency4_samples,
    sparse_residency8_samples,
    sparse_residency16_samples,
    sparse_residency_aliased,
    variable_multisample_rate,
    inherited_queries,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_request_is_always_supported() {
        let supported = vk::PhysicalDeviceFeatures::default();
        let requested = vk::PhysicalDeviceFeatures::default();
        assert!(missing_features(&supported, &requested).is_empty());
    }

    #[test]
    fn single_missing_flag_is_reported() {
        let supported = vk::PhysicalDeviceFeatures::default()
            .sampler_anisotropy(true)
            .fill_mode_non_solid(true);
        let requested = vk::PhysicalDeviceFeatures::default()
            .sampler_anisotropy(true)
            .fill_mode_non_solid(true)
            .inherited_queries(true);

        assert_eq!(missing_features(&supported, &requested), vec!["inherited_queries"]);
    }

    #[test]
    fn extra_supported_flags_are_ignored() {
        let supported = vk::PhysicalDeviceFeatures::default()
            .geometry_shader(true)
            .shader_int64(true);
        let requested = vk::PhysicalDeviceFeatures::default().shader_int64(true);
        assert!(missing_features(&supported, &requested).is_empty());
    }

    #[test]
    fn counts_enabled_flags() {
        let features = vk::PhysicalDeviceFeatures::default()
            .wide_lines(true)
            .sparse_residency16_samples(true);
        assert_eq!(enabled_count(&features), 2);
    }
}
