//! Recognizer documents as produced by different recognizer revisions

#![allow(dead_code)]

/// A raw recognizer document and what the catalog should end up with.
#[derive(Debug, Clone)]
pub struct MenuFixture {
    pub description: &'static str,
    pub document: &'static str,
    pub expected_restaurant: &'static str,
    pub expected_dishes: &'static [(&'static str, f64)],
}

impl MenuFixture {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(self.document).expect("fixture document is valid JSON")
    }
}

pub const ENGLISH_MENU: MenuFixture = MenuFixture {
    description: "English field names, single dish",
    document: r#"{"restaurant_name":"Joe's","dishes":[{"name":"Rice","price":"8"}]}"#,
    expected_restaurant: "Joe's",
    expected_dishes: &[("Rice", 8.0)],
};

pub const CHINESE_MENU: MenuFixture = MenuFixture {
    description: "Chinese field names with price ranges",
    document: r#"{
        "店名": "第一食堂",
        "window_number": "3",
        "菜品": [
            {"名称": "宫保鸡丁", "价格": "12-15元"},
            {"名称": "番茄炒蛋", "价格": "¥9"},
            {"名称": "米饭", "价格": "1元/两"}
        ]
    }"#,
    expected_restaurant: "第一食堂",
    expected_dishes: &[("宫保鸡丁", 12.0), ("番茄炒蛋", 9.0), ("米饭", 1.0)],
};

pub const MALFORMED_MENU: MenuFixture = MenuFixture {
    description: "No restaurant name and dish entries without fields",
    document: r#"{"dishes":[{},{"note":"spicy"}]}"#,
    expected_restaurant: "unknown restaurant",
    expected_dishes: &[("unknown dish", 0.0)],
};

pub const ALL_MENUS: &[MenuFixture] = &[ENGLISH_MENU, CHINESE_MENU, MALFORMED_MENU];
