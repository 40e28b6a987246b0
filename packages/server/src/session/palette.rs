//! ユーザーに割り当てる表示色

use natter_shared::protocol::UserColor;

/// 初回接続時に 1 色が選ばれるパレット
pub const PALETTE: [UserColor; 20] = [
    UserColor::new(200, 10, 10),   // red
    UserColor::new(20, 170, 20),   // green
    UserColor::new(20, 60, 200),   // blue
    UserColor::new(230, 120, 20),  // orange
    UserColor::new(230, 210, 20),  // yellow
    UserColor::new(150, 50, 200),  // purple
    UserColor::new(20, 200, 200),  // cyan
    UserColor::new(200, 20, 140),  // magenta
    UserColor::new(10, 140, 140),  // teal
    UserColor::new(150, 230, 30),  // lime
    UserColor::new(230, 110, 170), // pink
    UserColor::new(120, 75, 40),   // brown
    UserColor::new(20, 30, 80),    // navy
    UserColor::new(110, 120, 30),  // olive
    UserColor::new(120, 20, 40),   // maroon
    UserColor::new(220, 180, 20),  // gold
    UserColor::new(90, 170, 230),  // sky
    UserColor::new(170, 70, 230),  // violet
    UserColor::new(240, 100, 90),  // coral
    UserColor::new(75, 0, 130),    // indigo
];
