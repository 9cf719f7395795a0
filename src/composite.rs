use image::{DynamicImage, ImageBuffer, Rgb};

/// Side length of an album collage.
pub const COLLAGE_SIDE: u32 = 256;

/// Grid used for an album collage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollageLayout {
    pub grid_size: u32,
    pub cell_size: u32,
}

impl CollageLayout {
    /// 2x2 cells of 128px for up to four files, 3x3 cells of 86px otherwise.
    pub fn for_count(file_count: usize) -> Self {
        if file_count <= 4 {
            Self {
                grid_size: 2,
                cell_size: 128,
            }
        } else {
            Self {
                grid_size: 3,
                cell_size: 86,
            }
        }
    }

    pub fn capacity(&self) -> usize {
        (self.grid_size * self.grid_size) as usize
    }

    /// Top-left corner of the cell at `index`, filled row by row.
    pub fn cell_origin(&self, index: usize) -> (u32, u32) {
        let index = index as u32;
        let col = index % self.grid_size;
        let row = index / self.grid_size;
        (col * self.cell_size, row * self.cell_size)
    }
}

/// Tile images into a black square canvas. Tiles beyond the layout's
/// capacity are ignored; cells without a tile stay black.
pub fn compose_album_collage(layout: CollageLayout, tiles: &[DynamicImage]) -> DynamicImage {
    let mut collage = ImageBuffer::from_pixel(COLLAGE_SIDE, COLLAGE_SIDE, Rgb([0u8, 0u8, 0u8]));

    for (idx, tile) in tiles.iter().take(layout.capacity()).enumerate() {
        let (x, y) = layout.cell_origin(idx);
        // Cells are squares, the tile is stretched to fill its cell
        let resized = tile
            .thumbnail_exact(layout.cell_size, layout.cell_size)
            .to_rgb8();
        image::imageops::overlay(&mut collage, &resized, x as i64, y as i64);
    }

    DynamicImage::ImageRgb8(collage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgba};

    fn create_test_image(width: u32, height: u32, color: Rgba<u8>) -> DynamicImage {
        let img = ImageBuffer::from_pixel(width, height, color);
        DynamicImage::ImageRgba8(img)
    }

    #[test]
    fn test_layout_selection() {
        assert_eq!(CollageLayout::for_count(1).grid_size, 2);
        assert_eq!(CollageLayout::for_count(4).cell_size, 128);
        assert_eq!(CollageLayout::for_count(5).grid_size, 3);
        assert_eq!(CollageLayout::for_count(20).cell_size, 86);
        assert_eq!(CollageLayout::for_count(20).capacity(), 9);
    }

    #[test]
    fn test_cell_origin() {
        let layout = CollageLayout::for_count(9);
        assert_eq!(layout.cell_origin(0), (0, 0));
        assert_eq!(layout.cell_origin(2), (172, 0));
        assert_eq!(layout.cell_origin(4), (86, 86));
        assert_eq!(layout.cell_origin(8), (172, 172));
    }

    #[test]
    fn test_compose_two_by_two() {
        let tiles = vec![
            create_test_image(300, 200, Rgba([255, 0, 0, 255])),
            create_test_image(100, 100, Rgba([0, 255, 0, 255])),
            create_test_image(50, 80, Rgba([0, 0, 255, 255])),
        ];

        let collage = compose_album_collage(CollageLayout::for_count(tiles.len()), &tiles);
        assert_eq!(collage.dimensions(), (256, 256));

        assert_eq!(collage.get_pixel(0, 0), Rgba([255, 0, 0, 255]));
        assert_eq!(collage.get_pixel(127, 127), Rgba([255, 0, 0, 255]));
        assert_eq!(collage.get_pixel(128, 0), Rgba([0, 255, 0, 255]));
        assert_eq!(collage.get_pixel(0, 128), Rgba([0, 0, 255, 255]));
        // Fourth cell has no tile
        assert_eq!(collage.get_pixel(200, 200), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_compose_three_by_three_ignores_extra_tiles() {
        let tiles: Vec<_> = (0..12)
            .map(|i| create_test_image(40, 40, Rgba([(i * 20) as u8, 100, 100, 255])))
            .collect();

        let collage = compose_album_collage(CollageLayout::for_count(tiles.len()), &tiles);
        assert_eq!(collage.dimensions(), (256, 256));
        assert_eq!(collage.get_pixel(10, 10), Rgba([0, 100, 100, 255]));
        assert_eq!(collage.get_pixel(180, 180), Rgba([160, 100, 100, 255]));
    }

    #[test]
    fn test_compose_empty() {
        let collage = compose_album_collage(CollageLayout::for_count(0), &[]);
        assert_eq!(collage.dimensions(), (256, 256));
        assert_eq!(collage.get_pixel(128, 128), Rgba([0, 0, 0, 255]));
    }
}
