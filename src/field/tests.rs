#[cfg(test)]
mod field_tests {
    use crate::field::Field;

    fn ramp_field(size: [usize; 3]) -> Field {
        let length = size[0] * size[1] * size[2];
        let data = (0..length).map(|i| i as f32).collect();
        Field::from_raw_data("ramp", data, size, [1.0, 1.0, 1.0]).ok().unwrap()
    }

    #[test]
    fn test_normalisation_limits_and_length() {
        let field = ramp_field([4, 3, 5]);

        assert!(field.data().len() == 4 * 3 * 5);
        assert!(field.data().iter().all(|v| (0.0..=1.0).contains(v)));
        assert!(field.data().first() == Some(&0.0));
        assert!(field.data().last() == Some(&1.0));
        assert!(field.min_value() == 0.0);
        assert!(field.max_value() == (4.0 * 3.0 * 5.0) - 1.0);
    }

    #[test]
    fn test_half_extents_are_unit_normalised() {
        let field = Field::from_raw_data(
            "aniso",
            (0..8 * 4 * 2).map(|i| i as f32).collect(),
            [8, 4, 2],
            [0.5, 1.0, 4.0],
        )
        .ok()
        .unwrap();

        // physical extents: 4, 4, 8 -> normalised to 0.5, 0.5, 1
        assert!((field.half_extent().x - 0.5).abs() < f32::EPSILON);
        assert!((field.half_extent().y - 0.5).abs() < f32::EPSILON);
        assert!((field.half_extent().z - 1.0).abs() < f32::EPSILON);

        // voxel extent recovers the box: extent * size == 2 * half extent
        assert!((field.voxel_extent().x * 8.0 - 1.0).abs() < 1e-6);
        assert!((field.voxel_extent().z * 2.0 - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_field_and_texture_value_round_trip() {
        let data = vec![3.0, -1.0, 7.0, 5.0, 0.0, 2.0, 4.0, 1.0];
        let field = Field::from_raw_data("roundtrip", data, [2, 2, 2], [1.0, 1.0, 1.0])
            .ok()
            .unwrap();

        assert!(field.min_value() == -1.0);
        assert!(field.max_value() == 7.0);

        for field_value in [-1.0, 0.0, 3.3, 7.0] {
            let texture_value = field.field_value_to_texture_value(field_value);
            let recovered = field.texture_value_to_field_value(texture_value);
            assert!((recovered - field_value).abs() < 1e-5);
        }
    }

    #[test]
    fn test_rejects_degenerate_inputs() {
        assert!(Field::from_raw_data("flat", vec![1.0; 8], [2, 2, 2], [1.0, 1.0, 1.0]).is_err());
        assert!(Field::from_raw_data("thin", vec![0.0; 4], [1, 2, 2], [1.0, 1.0, 1.0]).is_err());
        assert!(
            Field::from_raw_data("short", vec![0.0, 1.0], [2, 2, 2], [1.0, 1.0, 1.0]).is_err()
        );
        assert!(Field::from_raw_data(
            "badspacing",
            (0..8).map(|i| i as f32).collect(),
            [2, 2, 2],
            [1.0, 0.0, 1.0]
        )
        .is_err());
    }

    #[test]
    fn test_clip_values_renormalises() {
        let mut field = ramp_field([4, 4, 4]);
        let quarter = field.texture_value_to_field_value(0.25);
        let three_quarters = field.texture_value_to_field_value(0.75);

        field.clip_values(quarter, three_quarters).ok().unwrap();

        assert!(field.data().iter().all(|v| (0.0..=1.0).contains(v)));
        assert!(field.data().first() == Some(&0.0));
        assert!(field.data().last() == Some(&1.0));
        assert!((field.min_value() - quarter).abs() < 1e-4);
        assert!((field.max_value() - three_quarters).abs() < 1e-4);
    }

    #[test]
    fn test_clip_values_rejects_inverted_range() {
        let mut field = ramp_field([2, 2, 2]);
        assert!(field.clip_values(5.0, 1.0).is_err());
    }
}

#[cfg(test)]
mod bifrost_tests {
    use crate::error::EngineError;
    use crate::field::bifrost::create_field_from_bifrost_file;

    fn write_test_files(stem: &str, header: &str, values: &[f32]) -> (std::path::PathBuf, std::path::PathBuf) {
        let dir = std::env::temp_dir();
        let header_path = dir.join(format!("{}.dat", stem));
        let data_path = dir.join(format!("{}.raw", stem));

        std::fs::write(&header_path, header).ok().unwrap();
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
        std::fs::write(&data_path, bytes).ok().unwrap();

        (data_path, header_path)
    }

    fn valid_header() -> String {
        let endianness = if cfg!(target_endian = "little") { 'l' } else { 'b' };
        format!(
            "element_kind : f\n\
             element_size : 4\n\
             endianness : {}\n\
             dimensions : 3\n\
             order : C\n\
             x_size : 2\n\
             y_size : 2\n\
             z_size : 2\n\
             dx : 1.0\n\
             dy : 1.0\n\
             dz : 2.0\n",
            endianness
        )
    }

    #[test]
    fn test_loads_valid_file_pair() {
        let values: Vec<f32> = (0..8).map(|i| i as f32).collect();
        let (data_path, header_path) = write_test_files("bifrost_valid", &valid_header(), &values);

        let field = create_field_from_bifrost_file("loaded", &data_path, &header_path)
            .ok()
            .unwrap();

        assert!(field.size() == [2, 2, 2]);
        assert!(field.min_value() == 0.0);
        assert!(field.max_value() == 7.0);
        assert!(field.voxel(1, 1, 1) == 1.0);
    }

    #[test]
    fn test_reload_yields_identical_data() {
        let values: Vec<f32> = (0..8).map(|i| (i * i) as f32).collect();
        let (data_path, header_path) = write_test_files("bifrost_reload", &valid_header(), &values);

        let first = create_field_from_bifrost_file("first", &data_path, &header_path)
            .ok()
            .unwrap();
        let second = create_field_from_bifrost_file("second", &data_path, &header_path)
            .ok()
            .unwrap();

        assert!(first.data() == second.data());
        assert!(first.size() == second.size());
    }

    #[test]
    fn test_missing_header_entry_is_rejected() {
        let header = valid_header().replace("element_size : 4\n", "");
        let (data_path, header_path) = write_test_files("bifrost_missing", &header, &[0.0f32; 8]);

        let result = create_field_from_bifrost_file("broken", &data_path, &header_path);
        assert!(matches!(result, Err(EngineError::BadHeader(_))));
    }

    #[test]
    fn test_contradicting_header_is_rejected() {
        let header = valid_header().replace("element_kind : f", "element_kind : i");
        let values: Vec<f32> = (0..8).map(|i| i as f32).collect();
        let (data_path, header_path) = write_test_files("bifrost_contradiction", &header, &values);

        let result = create_field_from_bifrost_file("broken", &data_path, &header_path);
        assert!(matches!(result, Err(EngineError::BadFieldData(_))));
    }

    #[test]
    fn test_truncated_data_file_is_rejected() {
        let values: Vec<f32> = (0..5).map(|i| i as f32).collect();
        let (data_path, header_path) = write_test_files("bifrost_short", &valid_header(), &values);

        let result = create_field_from_bifrost_file("broken", &data_path, &header_path);
        assert!(matches!(result, Err(EngineError::BadFieldData(_))));
    }
}
