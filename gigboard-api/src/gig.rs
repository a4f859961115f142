use crate::{Error, GigId, Time, User};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum Category {
    Rock,
    Metal,
    Punk,
    #[serde(rename = "R&B")]
    RnB,
    Rap,
    #[serde(rename = "Techno/Electronic")]
    TechnoElectronic,
    Country,
    #[serde(rename = "Folk/World")]
    FolkWorld,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Rock,
        Category::Metal,
        Category::Punk,
        Category::RnB,
        Category::Rap,
        Category::TechnoElectronic,
        Category::Country,
        Category::FolkWorld,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Rock => "Rock",
            Category::Metal => "Metal",
            Category::Punk => "Punk",
            Category::RnB => "R&B",
            Category::Rap => "Rap",
            Category::TechnoElectronic => "Techno/Electronic",
            Category::Country => "Country",
            Category::FolkWorld => "Folk/World",
        }
    }

    pub fn from_name(name: &str) -> Option<Category> {
        Category::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Gig {
    pub id: GigId,
    pub owner: User,
    pub title: String,
    pub text: String,
    pub category: Category,
    pub created_at: Time,
    pub updated_at: Time,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewGig {
    pub title: String,
    pub text: String,
    pub category: Category,
}

impl NewGig {
    pub fn validate(&self) -> Result<(), Error> {
        for (field, value) in [("title", &self.title), ("text", &self.text)] {
            crate::validate_string(value)?;
            if value.trim().is_empty() {
                return Err(Error::EmptyField(String::from(field)));
            }
        }
        Ok(())
    }
}
