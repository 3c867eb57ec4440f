// THEORY (Single-pixel channel conversions):
// The `Pixel` module is the smallest unit of the detector. It holds one RGB
// sample and knows how to re-express it in the color spaces a `ColorProfile`
// may be calibrated in. Everything here is 1D: no neighbors, no history.
//
// Two spaces are supported:
// - RGB: the raw channels, returned untouched.
// - HSV (8-bit convention): hue stored as degrees / 2 so the full circle fits
//   in 0..=179, saturation and value scaled to 0..=255. Calibration bounds are
//   written in this convention, so thresholds compare directly against bytes.
//
// Hue is computed on normalized sRGB (no linearization). Profiles are tuned by
// eye against the same gamma-encoded camera output, so the fast path is also
// the correct one here.

pub mod pixel {
    use image::Rgb;

    pub type Channel = u8;
    pub type Channels = [Channel; 3];
    pub type NormalizedChannel = f32;
    pub type Hue = f32;
    pub type SaturationHSV = f32;
    pub type ValueHSV = f32;

    /// Degrees per stored hue step in the 8-bit HSV convention.
    const HUE_DEGREES_PER_STEP: f32 = 2.0;
    /// Number of distinct stored hue values (0..=179).
    const HUE_STEPS: u16 = 180;

    /// A "dumb" data container representing a single RGB pixel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Pixel {
        /// The red channel value (0-255).
        pub red: Channel,
        /// The green channel value (0-255).
        pub green: Channel,
        /// The blue channel value (0-255).
        pub blue: Channel,
    }

    impl Pixel {
        pub fn new(red: Channel, green: Channel, blue: Channel) -> Self {
            Self { red, green, blue }
        }

        /// Raw channels in R, G, B order.
        pub fn channels(&self) -> Channels {
            [self.red, self.green, self.blue]
        }

        fn normalized(&self) -> (NormalizedChannel, NormalizedChannel, NormalizedChannel) {
            (
                self.red as NormalizedChannel / 255.0,
                self.green as NormalizedChannel / 255.0,
                self.blue as NormalizedChannel / 255.0,
            )
        }

        /// Hue angle in degrees [0, 360). Gray pixels report 0.
        pub fn hue(&self) -> Hue {
            let (red, green, blue) = self.normalized();
            let maximum_channel = red.max(green.max(blue));
            let minimum_channel = red.min(green.min(blue));
            let chroma = maximum_channel - minimum_channel;

            if chroma <= 1e-6 {
                return 0.0;
            }

            let inverse_chroma = 1.0 / chroma;

            let (base_difference, sector_offset) = if maximum_channel == red {
                (green - blue, 0.0)
            } else if maximum_channel == green {
                (blue - red, 2.0)
            } else {
                (red - green, 4.0)
            };

            let mut hue_degrees = (base_difference * inverse_chroma + sector_offset) * 60.0;
            if hue_degrees < 0.0 {
                hue_degrees += 360.0;
            }
            hue_degrees
        }

        /// HSV Value (V): max(R, G, B) on the 0..1 scale.
        pub fn value_hsv(&self) -> ValueHSV {
            let (red, green, blue) = self.normalized();
            red.max(green.max(blue))
        }

        /// HSV Saturation (S): chroma / value on the 0..1 scale, zero for black.
        pub fn saturation_hsv(&self) -> SaturationHSV {
            let (red, green, blue) = self.normalized();
            let maximum_channel = red.max(green.max(blue));
            if maximum_channel <= 1e-6 {
                return 0.0;
            }
            let minimum_channel = red.min(green.min(blue));
            (maximum_channel - minimum_channel) / maximum_channel
        }

        /// Packs the pixel into 8-bit HSV: `[hue / 2, saturation * 255, value * 255]`.
        pub fn to_hsv(&self) -> Channels {
            let hue_step = (self.hue() / HUE_DEGREES_PER_STEP).round() as u16 % HUE_STEPS;
            let saturation = (self.saturation_hsv() * 255.0).round().clamp(0.0, 255.0);
            let value = (self.value_hsv() * 255.0).round().clamp(0.0, 255.0);
            [hue_step as Channel, saturation as Channel, value as Channel]
        }
    }

    impl From<Rgb<u8>> for Pixel {
        fn from(rgb: Rgb<u8>) -> Self {
            let [red, green, blue] = rgb.0;
            Pixel::new(red, green, blue)
        }
    }

    impl From<&Rgb<u8>> for Pixel {
        fn from(rgb: &Rgb<u8>) -> Self {
            Pixel::from(*rgb)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::pixel::Pixel;

    #[test]
    fn primaries_map_to_half_degree_hues() {
        assert_eq!(Pixel::new(255, 0, 0).to_hsv(), [0, 255, 255]);
        assert_eq!(Pixel::new(255, 255, 0).to_hsv(), [30, 255, 255]);
        assert_eq!(Pixel::new(0, 255, 0).to_hsv(), [60, 255, 255]);
        assert_eq!(Pixel::new(0, 0, 255).to_hsv(), [120, 255, 255]);
    }

    #[test]
    fn grays_have_no_hue_or_saturation() {
        assert_eq!(Pixel::new(0, 0, 0).to_hsv(), [0, 0, 0]);
        assert_eq!(Pixel::new(128, 128, 128).to_hsv(), [0, 0, 128]);
        assert_eq!(Pixel::new(255, 255, 255).to_hsv(), [0, 0, 255]);
    }

    #[test]
    fn hue_wraps_below_full_circle() {
        // Magenta-red sits just under 360 degrees and must not spill to 180.
        let hsv = Pixel::new(255, 0, 2).to_hsv();
        assert!(hsv[0] < 180);
    }

    #[test]
    fn hue_rounding_to_full_circle_lands_on_zero() {
        // 359.76 and 359.06 degrees round up to step 180, which is red again.
        assert_eq!(Pixel::new(255, 0, 1).to_hsv(), [0, 255, 255]);
        assert_eq!(Pixel::new(255, 0, 4).to_hsv()[0], 0);
        // 357.88 degrees is the last step before the wrap.
        assert_eq!(Pixel::new(255, 0, 9).to_hsv()[0], 179);
    }

    #[test]
    fn value_is_the_brightest_channel() {
        for level in 0..=255u8 {
            assert_eq!(Pixel::new(0, level, level / 2).to_hsv()[2], level);
        }
    }

    #[test]
    fn rgb_channels_pass_through() {
        assert_eq!(Pixel::new(12, 34, 56).channels(), [12, 34, 56]);
        assert_eq!(Pixel::from(image::Rgb([1, 2, 3])), Pixel::new(1, 2, 3));
    }
}
