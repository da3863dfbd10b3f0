/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::{
    cell::RefCell,
    fmt,
    hash::Hash,
    io::Write,
    rc::{Rc, Weak},
};

use indexmap::IndexMap;

use crate::{
    property::{ChangeListener, ComplexProperty, PropertyCore},
    update::{write_indexed_field_uri, PropertyDefinition, ServiceObject},
    xml::{EwsXmlReader, EwsXmlWriter, XmlNamespace, XmlNodeType, XmlValue},
    Error,
};

/// A value usable as the key of a dictionary property. Its XML text form is
/// both the `Key` attribute of an entry and the `FieldIndex` addressing it.
pub trait DictionaryKey: XmlValue + Clone + Eq + Hash + fmt::Debug + 'static {}

impl<K> DictionaryKey for K where K: XmlValue + Clone + Eq + Hash + fmt::Debug + 'static {}

/// An entry of a [`DictionaryProperty`].
pub trait DictionaryEntry: ComplexProperty {
    type Key: DictionaryKey;

    fn key(&self) -> &Self::Key;

    /// Writes the `Key` attribute identifying this entry.
    fn write_key_attribute<W: Write>(&self, writer: &mut EwsXmlWriter<W>) -> Result<(), Error> {
        writer.write_attribute_value("Key", self.key())
    }
}

/// Describes the entries a [`DictionaryProperty`] holds.
pub trait DictionarySchema {
    type Entry: DictionaryEntry + 'static;

    /// The field URI entries are addressed under, e.g.
    /// `contacts:EmailAddress`.
    fn field_uri(&self) -> &'static str;

    /// Creates an empty entry for `key`, to be populated from XML.
    fn create_entry_instance(&self, key: <Self::Entry as DictionaryEntry>::Key) -> Self::Entry;

    fn entry_xml_element_name(&self) -> &'static str {
        "Entry"
    }
}

type KeyOf<S> = <<S as DictionarySchema>::Entry as DictionaryEntry>::Key;

struct ChangeLog<K> {
    added: Vec<K>,
    modified: Vec<K>,
}

impl<K: PartialEq> ChangeLog<K> {
    fn forget(&mut self, key: &K) {
        self.added.retain(|added| added != key);
        self.modified.retain(|modified| modified != key);
    }
}

struct DictionaryState<K> {
    core: PropertyCore,
    log: RefCell<ChangeLog<K>>,
}

impl<K: Clone + PartialEq> DictionaryState<K> {
    fn entry_changed(&self, key: &K) {
        {
            let mut log = self.log.borrow_mut();
            if log.added.contains(key) {
                return;
            }

            if !log.modified.contains(key) {
                log.modified.push(key.clone());
            }
        }

        self.core.changed();
    }
}

/// Links an entry back to the dictionary containing it.
struct EntryLink<K> {
    key: K,
    dictionary: Weak<DictionaryState<K>>,
}

impl<K: Clone + PartialEq> ChangeListener for EntryLink<K> {
    fn property_changed(&self) {
        if let Some(dictionary) = self.dictionary.upgrade() {
            dictionary.entry_changed(&self.key);
        }
    }
}

/// A keyed collection of entries, such as the email addresses of a contact,
/// which records which keys were added, modified and removed.
///
/// Each entry is addressed individually in updates through an
/// `IndexedFieldURI` whose index is the entry's key.
pub struct DictionaryProperty<S: DictionarySchema> {
    schema: S,
    entries: IndexMap<KeyOf<S>, S::Entry>,
    removed: IndexMap<KeyOf<S>, S::Entry>,
    state: Rc<DictionaryState<KeyOf<S>>>,
}

impl<S: DictionarySchema> DictionaryProperty<S> {
    pub fn new(schema: S) -> Self {
        Self {
            schema,
            entries: IndexMap::new(),
            removed: IndexMap::new(),
            state: Rc::new(DictionaryState {
                core: PropertyCore::default(),
                log: RefCell::new(ChangeLog {
                    added: Vec::new(),
                    modified: Vec::new(),
                }),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &KeyOf<S>) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &KeyOf<S>) -> Option<&S::Entry> {
        self.entries.get(key)
    }

    /// Gives access to an entry for editing through its setters.
    pub fn entry_mut(&mut self, key: &KeyOf<S>) -> Option<&mut S::Entry> {
        self.entries.get_mut(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&KeyOf<S>, &S::Entry)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &KeyOf<S>> {
        self.entries.keys()
    }

    /// Adds an entry under its key. Fails if the key is already present.
    pub fn add(&mut self, entry: S::Entry) -> Result<(), Error> {
        let key = entry.key().clone();
        if self.entries.contains_key(&key) {
            return Err(Error::DuplicateKey(format!("{key:?}")));
        }

        self.attach(&entry);
        self.entries.insert(key.clone(), entry);
        self.removed.shift_remove(&key);

        {
            let mut log = self.state.log.borrow_mut();
            if !log.added.contains(&key) {
                log.added.push(key);
            }
        }

        self.changed();
        Ok(())
    }

    /// Stores an entry under its key, replacing any entry already there.
    pub fn add_or_replace(&mut self, entry: S::Entry) -> Result<(), Error> {
        let key = entry.key().clone();
        let Some(existing) = self.entries.get_mut(&key) else {
            return self.add(entry);
        };

        existing.core().notifier().set_owner(None);
        *existing = entry;
        self.attach_key(&key);

        {
            let mut log = self.state.log.borrow_mut();
            if !log.added.contains(&key) && !log.modified.contains(&key) {
                log.modified.push(key);
            }
        }

        self.changed();
        Ok(())
    }

    /// Removes the entry under `key`, recording a delete for it. Returns
    /// whether the key was present.
    ///
    /// A delete is recorded even for an entry added since the last save,
    /// which the server treats as a no-op if the field was never set.
    pub fn remove(&mut self, key: &KeyOf<S>) -> bool {
        self.state.log.borrow_mut().forget(key);

        let Some(entry) = self.entries.shift_remove(key) else {
            return false;
        };

        entry.core().notifier().set_owner(None);
        self.removed.insert(key.clone(), entry);

        self.changed();
        true
    }

    pub fn added_keys(&self) -> Vec<KeyOf<S>> {
        self.state.log.borrow().added.clone()
    }

    pub fn modified_keys(&self) -> Vec<KeyOf<S>> {
        self.state.log.borrow().modified.clone()
    }

    pub fn removed_keys(&self) -> Vec<KeyOf<S>> {
        self.removed.keys().cloned().collect()
    }

    pub fn has_changes(&self) -> bool {
        let log = self.state.log.borrow();
        !(log.added.is_empty() && log.modified.is_empty() && self.removed.is_empty())
    }

    /// Writes one `SetField` operation per added entry, then per modified
    /// entry.
    pub fn write_set_update_to_xml<W: Write>(
        &self,
        writer: &mut EwsXmlWriter<W>,
        object: &ServiceObject,
        property: &PropertyDefinition,
    ) -> Result<(), Error> {
        let pending: Vec<_> = {
            let log = self.state.log.borrow();
            log.added.iter().chain(&log.modified).cloned().collect()
        };

        for key in pending {
            let Some(entry) = self.entries.get(&key) else {
                continue;
            };

            if entry.write_set_update_to_xml(writer, object, property)? {
                continue;
            }

            writer.write_start_element(XmlNamespace::Types, object.set_field_xml_element_name())?;
            self.write_uri_to_xml(writer, &key)?;
            writer.write_start_element(XmlNamespace::Types, object.xml_element_name())?;
            writer.write_start_element(self.namespace(), property.xml_element_name())?;
            entry.write_to_xml(writer, self.schema.entry_xml_element_name())?;
            writer.write_end_element()?;
            writer.write_end_element()?;
            writer.write_end_element()?;
        }

        Ok(())
    }

    /// Writes one `DeleteField` operation per removed entry.
    pub fn write_delete_update_to_xml<W: Write>(
        &self,
        writer: &mut EwsXmlWriter<W>,
        object: &ServiceObject,
    ) -> Result<(), Error> {
        for (key, entry) in &self.removed {
            if entry.write_delete_update_to_xml(writer, object)? {
                continue;
            }

            writer.write_start_element(
                XmlNamespace::Types,
                object.delete_field_xml_element_name(),
            )?;
            self.write_uri_to_xml(writer, key)?;
            writer.write_end_element()?;
        }

        Ok(())
    }

    /// Writes every pending change: sets first, then deletes.
    pub fn write_update_to_xml<W: Write>(
        &self,
        writer: &mut EwsXmlWriter<W>,
        object: &ServiceObject,
        property: &PropertyDefinition,
    ) -> Result<(), Error> {
        self.write_set_update_to_xml(writer, object, property)?;
        self.write_delete_update_to_xml(writer, object)
    }

    fn write_uri_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>, key: &KeyOf<S>) -> Result<(), Error> {
        write_indexed_field_uri(writer, self.schema.field_uri(), &key.to_xml_string()?)
    }

    fn attach(&self, entry: &S::Entry) {
        let link: Rc<dyn ChangeListener> = Rc::new(EntryLink {
            key: entry.key().clone(),
            dictionary: Rc::downgrade(&self.state),
        });
        entry.core().notifier().set_owner(Some(link));
    }

    fn attach_key(&self, key: &KeyOf<S>) {
        if let Some(entry) = self.entries.get(key) {
            self.attach(entry);
        }
    }

    fn load_entry(&mut self, reader: &mut EwsXmlReader<'_>) -> Result<(), Error> {
        let entry_name = self.schema.entry_xml_element_name();
        let key = reader
            .read_attribute_value::<KeyOf<S>>("Key")?
            .ok_or_else(|| Error::UnexpectedElement {
                expected: format!("`{entry_name}` with a `Key` attribute"),
                found: format!("`{entry_name}` without a key"),
            })?;

        let mut entry = self.schema.create_entry_instance(key);
        entry.load_from_xml(reader, entry_name)?;

        self.attach(&entry);
        self.entries.insert(entry.key().clone(), entry);

        Ok(())
    }
}

impl<S: DictionarySchema> ComplexProperty for DictionaryProperty<S> {
    fn core(&self) -> &PropertyCore {
        &self.state.core
    }

    /// Reads every entry in the element without recording them as added.
    fn load_from_xml_ns(
        &mut self,
        reader: &mut EwsXmlReader<'_>,
        namespace: XmlNamespace,
        local_name: &str,
    ) -> Result<(), Error> {
        reader.ensure_current_node_is_start_element(namespace, local_name)?;
        if reader.is_empty_element() {
            return reader.read();
        }

        loop {
            reader.read()?;

            match reader.node_type() {
                XmlNodeType::StartElement
                    if reader.local_name() == self.schema.entry_xml_element_name() =>
                {
                    self.load_entry(reader)?;
                }
                XmlNodeType::StartElement => {
                    log::debug!(
                        "skipping unrecognized element `{}` in dictionary `{local_name}`",
                        reader.local_name()
                    );
                    reader.skip_current_element()?;
                }
                XmlNodeType::EndOfDocument => return Err(Error::UnexpectedEndOfDocument),
                _ => {}
            }

            if reader.is_end_element(namespace, local_name) {
                return Ok(());
            }
        }
    }

    /// Writes the dictionary element and its entries. Nothing is written for
    /// an empty dictionary.
    fn write_to_xml_ns<W: Write>(
        &self,
        writer: &mut EwsXmlWriter<W>,
        namespace: XmlNamespace,
        local_name: &str,
    ) -> Result<(), Error> {
        if self.entries.is_empty() {
            return Ok(());
        }

        writer.write_start_element(namespace, local_name)?;
        self.write_elements_to_xml(writer)?;
        writer.write_end_element()
    }

    fn write_elements_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>) -> Result<(), Error> {
        let entry_name = self.schema.entry_xml_element_name();
        for entry in self.entries.values() {
            entry.write_to_xml(writer, entry_name)?;
        }

        Ok(())
    }

    fn clear_change_log(&mut self) {
        log::debug!("clearing change log of dictionary `{}`", self.schema.field_uri());

        {
            let mut log = self.state.log.borrow_mut();
            log.added.clear();
            log.modified.clear();
        }
        self.removed.clear();

        for entry in self.entries.values_mut() {
            entry.clear_change_log();
        }
    }

    fn validate(&self) -> Result<(), Error> {
        self.entries.values().try_for_each(ComplexProperty::validate)
    }
}

impl<S: DictionarySchema + Default> Default for DictionaryProperty<S> {
    fn default() -> Self {
        Self::new(S::default())
    }
}

impl<S: DictionarySchema> fmt::Debug for DictionaryProperty<S>
where
    S::Entry: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        test_utils::{assert_serialized_content, load_into, serialize_with},
        xml::xml_value_enum,
    };

    xml_value_enum! {
        enum Slot {
            First => "First",
            Second => "Second",
        }
    }

    #[derive(Debug)]
    struct Label {
        core: PropertyCore,
        key: Slot,
        text: String,
    }

    impl Label {
        fn new(key: Slot, text: &str) -> Self {
            Self {
                core: PropertyCore::default(),
                key,
                text: text.to_owned(),
            }
        }

        fn set_text(&mut self, text: &str) {
            self.core.set_value(&mut self.text, text.to_owned());
        }
    }

    impl ComplexProperty for Label {
        fn core(&self) -> &PropertyCore {
            &self.core
        }

        fn read_text_value_from_xml(&mut self, reader: &EwsXmlReader<'_>) -> Result<(), Error> {
            self.text = reader.value().to_owned();
            Ok(())
        }

        fn write_attributes_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>) -> Result<(), Error> {
            self.write_key_attribute(writer)
        }

        fn write_elements_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>) -> Result<(), Error> {
            writer.write_value(&self.text)
        }
    }

    impl DictionaryEntry for Label {
        type Key = Slot;

        fn key(&self) -> &Slot {
            &self.key
        }
    }

    #[derive(Default)]
    struct LabelSchema;

    impl DictionarySchema for LabelSchema {
        type Entry = Label;

        fn field_uri(&self) -> &'static str {
            "item:Label"
        }

        fn create_entry_instance(&self, key: Slot) -> Label {
            Label::new(key, "")
        }
    }

    type Labels = DictionaryProperty<LabelSchema>;

    const LABELS: PropertyDefinition = PropertyDefinition::new("Labels", "item:Labels");

    const LOADED: &str = r#"<t:Labels><t:Entry Key="First">one</t:Entry><t:Extra><t:Flag><t:X/></t:Flag><t:Entry Key="First">nested</t:Entry></t:Extra><t:Entry Key="Second">two</t:Entry></t:Labels>"#;

    fn loaded_labels() -> Labels {
        let mut labels = Labels::default();
        load_into(&mut labels, LOADED, "Labels");
        labels
    }

    fn write_update(labels: &Labels) -> String {
        serialize_with(|writer| {
            labels.write_update_to_xml(writer, &ServiceObject::item("Item"), &LABELS)
        })
    }

    #[test]
    fn loading_is_untracked() {
        let labels = loaded_labels();

        assert_eq!(labels.len(), 2);
        assert_eq!(labels.get(&Slot::First).unwrap().text, "one");
        assert_eq!(labels.get(&Slot::Second).unwrap().text, "two");
        assert!(!labels.has_changes());
        assert_eq!(write_update(&labels), "");
    }

    #[test]
    fn loaded_dictionary_round_trips() {
        let labels = loaded_labels();

        assert_serialized_content(
            &labels,
            "Labels",
            r#"<t:Labels><t:Entry Key="First">one</t:Entry><t:Entry Key="Second">two</t:Entry></t:Labels>"#,
        );
        assert_serialized_content(&Labels::default(), "Labels", "");
    }

    #[test]
    fn entries_without_keys_are_rejected() {
        let mut labels = Labels::default();
        let mut reader = EwsXmlReader::new(b"<t:Labels><t:Entry>one</t:Entry></t:Labels>");
        reader.read().unwrap();

        assert!(matches!(
            labels.load_from_xml(&mut reader, "Labels"),
            Err(Error::UnexpectedElement { .. })
        ));
    }

    #[test]
    fn edits_are_written_as_indexed_set_fields() {
        let mut labels = loaded_labels();
        labels.entry_mut(&Slot::First).unwrap().set_text("uno");

        assert_eq!(labels.modified_keys(), vec![Slot::First]);
        assert_eq!(
            write_update(&labels),
            concat!(
                r#"<t:SetItemField><t:IndexedFieldURI FieldURI="item:Label" FieldIndex="First"/>"#,
                r#"<t:Item><t:Labels><t:Entry Key="First">uno</t:Entry></t:Labels></t:Item>"#,
                r#"</t:SetItemField>"#
            )
        );
    }

    #[test]
    fn removal_is_written_as_indexed_delete_field() {
        let mut labels = loaded_labels();

        assert!(labels.remove(&Slot::Second));
        assert!(!labels.remove(&Slot::Second));
        assert_eq!(
            write_update(&labels),
            r#"<t:DeleteItemField><t:IndexedFieldURI FieldURI="item:Label" FieldIndex="Second"/></t:DeleteItemField>"#
        );
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let mut labels = loaded_labels();

        assert!(matches!(
            labels.add(Label::new(Slot::First, "again")),
            Err(Error::DuplicateKey(_))
        ));
    }

    #[test]
    fn modifying_an_added_entry_keeps_it_added_only() {
        let mut labels = Labels::default();
        labels.add(Label::new(Slot::First, "draft")).unwrap();
        labels.entry_mut(&Slot::First).unwrap().set_text("final");

        assert_eq!(labels.added_keys(), vec![Slot::First]);
        assert!(labels.modified_keys().is_empty());
        assert_eq!(write_update(&labels).matches("<t:SetItemField>").count(), 1);
    }

    #[test]
    fn replacing_marks_the_key_modified() {
        let mut labels = loaded_labels();
        labels
            .add_or_replace(Label::new(Slot::Second, "zwei"))
            .unwrap();

        assert_eq!(labels.modified_keys(), vec![Slot::Second]);
        assert_eq!(labels.get(&Slot::Second).unwrap().text, "zwei");

        // The replacement is tracked, not the entry it replaced.
        labels.entry_mut(&Slot::Second).unwrap().set_text("deux");
        assert_eq!(labels.modified_keys(), vec![Slot::Second]);
    }

    #[test]
    fn replacing_an_added_entry_keeps_it_added_only() {
        let mut labels = Labels::default();
        labels.add(Label::new(Slot::First, "draft")).unwrap();
        labels
            .add_or_replace(Label::new(Slot::First, "final"))
            .unwrap();

        assert_eq!(labels.added_keys(), vec![Slot::First]);
        assert!(labels.modified_keys().is_empty());
        assert_eq!(
            write_update(&labels),
            concat!(
                r#"<t:SetItemField><t:IndexedFieldURI FieldURI="item:Label" FieldIndex="First"/>"#,
                r#"<t:Item><t:Labels><t:Entry Key="First">final</t:Entry></t:Labels></t:Item>"#,
                r#"</t:SetItemField>"#
            )
        );
    }

    #[test]
    fn removing_a_modified_entry_only_deletes_it() {
        let mut labels = loaded_labels();
        labels.entry_mut(&Slot::First).unwrap().set_text("uno");
        assert_eq!(labels.modified_keys(), vec![Slot::First]);

        assert!(labels.remove(&Slot::First));
        assert!(labels.added_keys().is_empty());
        assert!(labels.modified_keys().is_empty());
        assert_eq!(labels.removed_keys(), vec![Slot::First]);
        assert_eq!(
            write_update(&labels),
            r#"<t:DeleteItemField><t:IndexedFieldURI FieldURI="item:Label" FieldIndex="First"/></t:DeleteItemField>"#
        );
    }

    #[test]
    fn re_adding_a_removed_key_replaces_the_delete() {
        let mut labels = loaded_labels();
        labels.remove(&Slot::First);
        labels.add(Label::new(Slot::First, "new")).unwrap();

        assert!(labels.removed_keys().is_empty());
        assert_eq!(labels.added_keys(), vec![Slot::First]);
        assert!(!write_update(&labels).contains("DeleteItemField"));
    }

    #[test]
    fn clearing_the_change_log_forgets_removals() {
        let mut labels = loaded_labels();
        labels.remove(&Slot::First);
        labels.clear_change_log();

        assert!(!labels.has_changes());
        assert_eq!(write_update(&labels), "");
    }
}
