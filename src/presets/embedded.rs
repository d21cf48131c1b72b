pub fn embedded_presets() -> &'static [(&'static str, &'static str)] {
    &[
        ("bloom", include_str!("../../presets/bloom.json")),
        ("octaves", include_str!("../../presets/octaves.json")),
        ("ribbon", include_str!("../../presets/ribbon.json")),
        ("spectrum", include_str!("../../presets/spectrum.json")),
        ("spread", include_str!("../../presets/spread.json")),
    ]
}
