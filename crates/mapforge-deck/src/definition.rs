//! Declarative deck-type definition files.
//!
//! A deck type is described by an XML file listing its card types:
//!
//! ```xml
//! <deck>
//!     <card name="The Fool" qty="1" art="cards/fool.png" desc="New beginnings."/>
//!     <card name="Gold Piece" qty="20" art="cards/gold.png"/>
//! </deck>
//! ```
//!
//! `qty` defaults to 1; `art` and `desc` may be empty. The definition is a
//! template — instantiating it into a live [`Deck`](crate::Deck) expands
//! quantities into individual card instances.

use std::path::Path;

use serde::Deserialize;

use crate::DeckError;

/// A parsed deck-type definition.
#[derive(Debug, Clone, Deserialize)]
pub struct DeckDefinition {
    #[serde(rename = "card", default)]
    pub cards: Vec<CardTypeDef>,
}

/// One card type within a definition.
#[derive(Debug, Clone, Deserialize)]
pub struct CardTypeDef {
    #[serde(rename = "@name")]
    pub name: String,
    /// How many copies of this card the deck starts with.
    #[serde(rename = "@qty", default = "default_quantity")]
    pub quantity: u32,
    /// Art asset filename, relative to the asset root. Empty for cards
    /// that never materialize as pogs.
    #[serde(rename = "@art", default)]
    pub art_file: String,
    #[serde(rename = "@desc", default)]
    pub description: String,
}

fn default_quantity() -> u32 {
    1
}

impl DeckDefinition {
    /// Parses a definition from XML text.
    pub fn parse(xml: &str) -> Result<Self, DeckError> {
        let def: DeckDefinition = quick_xml::de::from_str(xml)?;
        if def.cards.is_empty() {
            return Err(DeckError::Empty);
        }
        Ok(def)
    }

    /// Reads and parses a definition file.
    pub fn load(path: &Path) -> Result<Self, DeckError> {
        let xml = std::fs::read_to_string(path)?;
        Self::parse(&xml)
    }

    /// Total number of card instances this definition expands into.
    pub fn total_cards(&self) -> usize {
        self.cards.iter().map(|c| c.quantity as usize).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TAROT_XML: &str = r#"
        <deck>
            <card name="The Fool" art="cards/fool.png" desc="New beginnings."/>
            <card name="The Tower" art="cards/tower.png" desc="Sudden upheaval."/>
            <card name="Gold Piece" qty="3"/>
        </deck>
    "#;

    #[test]
    fn test_parse_reads_names_quantities_and_art() {
        let def = DeckDefinition::parse(TAROT_XML).unwrap();
        assert_eq!(def.cards.len(), 3);

        assert_eq!(def.cards[0].name, "The Fool");
        assert_eq!(def.cards[0].quantity, 1, "qty defaults to 1");
        assert_eq!(def.cards[0].art_file, "cards/fool.png");
        assert_eq!(def.cards[0].description, "New beginnings.");

        assert_eq!(def.cards[2].name, "Gold Piece");
        assert_eq!(def.cards[2].quantity, 3);
        assert_eq!(def.cards[2].art_file, "", "art is optional");

        assert_eq!(def.total_cards(), 5);
    }

    #[test]
    fn test_parse_rejects_malformed_xml() {
        assert!(matches!(
            DeckDefinition::parse("<deck><card/></deck"),
            Err(DeckError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_rejects_cardless_deck() {
        assert!(matches!(
            DeckDefinition::parse("<deck></deck>"),
            Err(DeckError::Empty)
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TAROT_XML.as_bytes()).unwrap();

        let def = DeckDefinition::load(file.path()).unwrap();
        assert_eq!(def.total_cards(), 5);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let result = DeckDefinition::load(Path::new("/nonexistent/tarot.xml"));
        assert!(matches!(result, Err(DeckError::Io(_))));
    }
}
