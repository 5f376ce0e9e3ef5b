//! Page layout calculations
//!
//! WordprocessingML measures page geometry in twentieths of a point
//! ("twips"); tab stops for the TOC rows and the footer are derived from the
//! text width of the section they appear in.

/// Simple length type stored in twips (1/1440 inch)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Length(i64);

impl Length {
    /// Create a length from twips
    pub fn from_twips(twips: i64) -> Self {
        Length(twips)
    }

    /// Create a length from inches
    pub fn from_inches(inches: f64) -> Self {
        Length((inches * 1440.0).round() as i64)
    }

    /// Get the value in twips
    pub fn twips(&self) -> i64 {
        self.0
    }
}

/// Page dimensions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageDimensions {
    pub width: Length,
    pub height: Length,
}

impl PageDimensions {
    /// A4 size (210mm × 297mm)
    pub fn a4() -> Self {
        Self {
            width: Length::from_twips(11906),
            height: Length::from_twips(16838),
        }
    }
}

/// Margins for page content
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margins {
    pub top: Length,
    pub bottom: Length,
    pub left: Length,
    pub right: Length,
}

impl Margins {
    /// Create margins with same value on all sides
    pub fn uniform(margin: Length) -> Self {
        Self {
            top: margin,
            bottom: margin,
            left: margin,
            right: margin,
        }
    }

    /// Standard 1-inch margins on all sides
    pub fn standard() -> Self {
        Self::uniform(Length::from_inches(1.0))
    }
}

/// Page size plus margins of one section
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub page: PageDimensions,
    pub margins: Margins,
}

impl Default for PageGeometry {
    /// A4 with one-inch margins, the layout of a blank document
    fn default() -> Self {
        Self {
            page: PageDimensions::a4(),
            margins: Margins::standard(),
        }
    }
}

impl PageGeometry {
    /// Width available to text between the left and right margins
    ///
    /// Never smaller than one inch, so tab stops stay usable on odd layouts.
    pub fn text_width(&self) -> Length {
        let width = self.page.width.twips() - self.margins.left.twips() - self.margins.right.twips();
        Length::from_twips(width.max(1440))
    }

    /// Position of a centered tab stop
    pub fn center_tab(&self) -> Length {
        Length::from_twips(self.text_width().twips() / 2)
    }

    /// Position of a right-aligned tab stop at the right margin
    pub fn right_tab(&self) -> Length {
        self.text_width()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_from_inches() {
        assert_eq!(Length::from_inches(1.0).twips(), 1440);
        assert_eq!(Length::from_inches(0.5).twips(), 720);
    }

    #[test]
    fn test_text_width_and_tabs() {
        let geometry = PageGeometry::default();
        assert_eq!(geometry.text_width().twips(), 11906 - 2 * 1440);
        assert_eq!(geometry.center_tab().twips(), (11906 - 2 * 1440) / 2);
        assert_eq!(geometry.right_tab(), geometry.text_width());
    }

    #[test]
    fn test_text_width_floor() {
        let geometry = PageGeometry {
            page: PageDimensions::a4(),
            margins: Margins::uniform(Length::from_inches(4.0)),
        };
        assert_eq!(geometry.text_width().twips(), 1440);
    }

    #[test]
    fn test_standard_margins() {
        let margins = Margins::standard();
        assert_eq!(margins.top.twips(), 1440); // 1 inch
        assert_eq!(margins.left, margins.right);
        assert_eq!(margins.top, margins.bottom);
    }
}
