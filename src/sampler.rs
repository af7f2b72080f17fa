// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
///How a consumer should filter a transferred surface when sampling it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterType {
    ///Interpolate between texels.
    #[default]
    Linear,
    ///Use the closest texel, e.g. for pixel-aligned content.
    Nearest,
}
