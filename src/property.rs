/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The building blocks shared by every change-tracked EWS property.

use std::{
    cell::{Cell, RefCell},
    fmt,
    io::Write,
    rc::{Rc, Weak},
};

use crate::{
    update::{PropertyDefinition, ServiceObject},
    xml::{EwsXmlReader, EwsXmlWriter, XmlNamespace, XmlNodeType},
    Error,
};

pub mod collection;
pub mod dictionary;
pub mod property_bag;

pub use self::collection::{CollectionSchema, ComplexPropertyCollection};
pub use self::dictionary::{DictionaryEntry, DictionaryKey, DictionaryProperty, DictionarySchema};
pub use self::property_bag::SimplePropertyBag;

/// A property shared between a collection and the code editing it.
///
/// Collections track their items by identity, so items live behind a shared
/// handle rather than being owned outright.
pub type Shared<T> = Rc<RefCell<T>>;

/// Receives a notification whenever an observed property changes.
pub trait ChangeListener {
    fn property_changed(&self);
}

/// Fans change notifications out to the listeners of a property.
///
/// External listeners are held weakly and are dropped from the list once they
/// go away. Separately, a property can be linked to the single tracked
/// structure (collection or dictionary) that currently contains it; that link
/// is notified after every external listener.
#[derive(Default)]
pub struct ChangeNotifier {
    listeners: RefCell<Vec<Weak<dyn ChangeListener>>>,
    owner: RefCell<Option<Rc<dyn ChangeListener>>>,
}

impl ChangeNotifier {
    /// Registers an external listener.
    pub fn subscribe<L: ChangeListener + 'static>(&self, listener: &Rc<L>) {
        let listener: Weak<L> = Rc::downgrade(listener);
        let listener: Weak<dyn ChangeListener> = listener;
        self.listeners.borrow_mut().push(listener);
    }

    /// Removes a previously registered external listener.
    pub fn unsubscribe<L: ChangeListener + 'static>(&self, listener: &Rc<L>) {
        let target = Rc::as_ptr(listener) as *const ();
        self.listeners
            .borrow_mut()
            .retain(|registered| registered.as_ptr() as *const () != target);
    }

    pub(crate) fn set_owner(&self, owner: Option<Rc<dyn ChangeListener>>) {
        *self.owner.borrow_mut() = owner;
    }

    pub(crate) fn has_owner(&self) -> bool {
        self.owner.borrow().is_some()
    }

    /// Notifies every live listener, then the owning structure.
    pub fn notify(&self) {
        // Listeners may subscribe or unsubscribe while being notified, so work
        // from a snapshot.
        let listeners: Vec<Rc<dyn ChangeListener>> = {
            let mut registered = self.listeners.borrow_mut();
            registered.retain(|listener| listener.strong_count() > 0);
            registered.iter().filter_map(Weak::upgrade).collect()
        };

        for listener in listeners {
            listener.property_changed();
        }

        let owner = self.owner.borrow().clone();
        if let Some(owner) = owner {
            owner.property_changed();
        }
    }
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("listeners", &self.listeners.borrow().len())
            .field("has_owner", &self.has_owner())
            .finish()
    }
}

/// State common to every complex property: the namespace its element is
/// written in and its change notifier.
///
/// Cloning a property's core yields one with the same namespace but no
/// listeners, as a copy of a property is not observed by anyone yet.
#[derive(Debug)]
pub struct PropertyCore {
    namespace: Cell<XmlNamespace>,
    notifier: ChangeNotifier,
}

impl PropertyCore {
    pub fn new(namespace: XmlNamespace) -> Self {
        Self {
            namespace: Cell::new(namespace),
            notifier: ChangeNotifier::default(),
        }
    }

    pub fn namespace(&self) -> XmlNamespace {
        self.namespace.get()
    }

    /// Changes the namespace the property is read from and written in. Only
    /// meaningful before the property is first used.
    pub fn set_namespace(&self, namespace: XmlNamespace) {
        self.namespace.set(namespace);
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    pub fn changed(&self) {
        self.notifier.notify();
    }

    /// Assigns an optional field, notifying listeners only if the value
    /// actually changed. Returns whether it did.
    pub fn set_field<V: PartialEq>(&self, field: &mut Option<V>, value: Option<V>) -> bool {
        if !can_set_field_value(field, &value) {
            return false;
        }

        *field = value;
        self.changed();
        true
    }

    /// Assigns a required field, notifying listeners only if the value
    /// actually changed. Returns whether it did.
    pub fn set_value<V: PartialEq>(&self, field: &mut V, value: V) -> bool {
        if *field == value {
            return false;
        }

        *field = value;
        self.changed();
        true
    }

    /// Assigns a field whose values can't be compared and always notifies.
    pub fn set_field_unchecked<V>(&self, field: &mut V, value: V) {
        *field = value;
        self.changed();
    }
}

impl Default for PropertyCore {
    fn default() -> Self {
        Self::new(XmlNamespace::Types)
    }
}

impl Clone for PropertyCore {
    fn clone(&self) -> Self {
        Self::new(self.namespace())
    }
}

/// Whether assigning `new` over `current` would change the stored value.
pub fn can_set_field_value<V: PartialEq>(current: &Option<V>, new: &Option<V>) -> bool {
    match (current, new) {
        (None, None) => false,
        (Some(current), Some(new)) => current != new,
        _ => true,
    }
}

/// A property made of attributes and child elements which can be loaded from
/// and written to EWS XML and which reports edits to whoever contains it.
///
/// Implementors override the hooks for the parts of the XML they understand;
/// the provided methods drive the element loop around them. Loading never
/// marks a property as changed, so hooks should assign fields directly rather
/// than through [`PropertyCore::set_field`].
pub trait ComplexProperty {
    fn core(&self) -> &PropertyCore;

    fn namespace(&self) -> XmlNamespace {
        self.core().namespace()
    }

    /// Notifies listeners and the containing structure that this property
    /// changed.
    fn changed(&self) {
        self.core().changed();
    }

    fn read_attributes_from_xml(&mut self, _reader: &EwsXmlReader<'_>) -> Result<(), Error> {
        Ok(())
    }

    /// Reads the child element the reader is positioned on, leaving the
    /// reader on its end. Returns `false` if the element is not recognized.
    fn try_read_element_from_xml(&mut self, _reader: &mut EwsXmlReader<'_>) -> Result<bool, Error> {
        Ok(false)
    }

    /// Like [`try_read_element_from_xml`](Self::try_read_element_from_xml),
    /// but for elements in a server response patching an existing property.
    fn try_read_element_from_xml_to_patch(
        &mut self,
        _reader: &mut EwsXmlReader<'_>,
    ) -> Result<bool, Error> {
        Ok(false)
    }

    fn read_text_value_from_xml(&mut self, _reader: &EwsXmlReader<'_>) -> Result<(), Error> {
        Ok(())
    }

    fn write_attributes_to_xml<W: Write>(&self, _writer: &mut EwsXmlWriter<W>) -> Result<(), Error> {
        Ok(())
    }

    fn write_elements_to_xml<W: Write>(&self, _writer: &mut EwsXmlWriter<W>) -> Result<(), Error> {
        Ok(())
    }

    /// Writes the `SetField` operations for this property as a member of a
    /// tracked structure. Returns `false` to have the container write its
    /// generic form instead.
    fn write_set_update_to_xml<W: Write>(
        &self,
        _writer: &mut EwsXmlWriter<W>,
        _object: &ServiceObject,
        _property: &PropertyDefinition,
    ) -> Result<bool, Error> {
        Ok(false)
    }

    /// Writes the `DeleteField` operations for this property as a removed
    /// member of a tracked structure. Returns `false` to have the container
    /// write its generic form instead.
    fn write_delete_update_to_xml<W: Write>(
        &self,
        _writer: &mut EwsXmlWriter<W>,
        _object: &ServiceObject,
    ) -> Result<bool, Error> {
        Ok(false)
    }

    /// Forgets any pending changes, e.g. after they were saved.
    fn clear_change_log(&mut self) {}

    fn validate(&self) -> Result<(), Error> {
        Ok(())
    }

    fn load_from_xml_ns(
        &mut self,
        reader: &mut EwsXmlReader<'_>,
        namespace: XmlNamespace,
        local_name: &str,
    ) -> Result<(), Error> {
        read_property_from_xml(self, reader, namespace, local_name, ReadMode::Load)
    }

    /// Populates the property from the element the reader is positioned on,
    /// leaving the reader on that element's end.
    fn load_from_xml(&mut self, reader: &mut EwsXmlReader<'_>, local_name: &str) -> Result<(), Error> {
        let namespace = self.namespace();
        self.load_from_xml_ns(reader, namespace, local_name)
    }

    fn update_from_xml_ns(
        &mut self,
        reader: &mut EwsXmlReader<'_>,
        namespace: XmlNamespace,
        local_name: &str,
    ) -> Result<(), Error> {
        read_property_from_xml(self, reader, namespace, local_name, ReadMode::Patch)
    }

    /// Applies the server-assigned values in the element the reader is
    /// positioned on, leaving every field it doesn't mention untouched.
    fn update_from_xml(&mut self, reader: &mut EwsXmlReader<'_>, local_name: &str) -> Result<(), Error> {
        let namespace = self.namespace();
        self.update_from_xml_ns(reader, namespace, local_name)
    }

    fn write_to_xml_ns<W: Write>(
        &self,
        writer: &mut EwsXmlWriter<W>,
        namespace: XmlNamespace,
        local_name: &str,
    ) -> Result<(), Error> {
        writer.write_start_element(namespace, local_name)?;
        self.write_attributes_to_xml(writer)?;
        self.write_elements_to_xml(writer)?;
        writer.write_end_element()
    }

    fn write_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>, local_name: &str) -> Result<(), Error> {
        self.write_to_xml_ns(writer, self.namespace(), local_name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ReadMode {
    Load,
    Patch,
}

fn read_property_from_xml<P: ComplexProperty + ?Sized>(
    property: &mut P,
    reader: &mut EwsXmlReader<'_>,
    namespace: XmlNamespace,
    local_name: &str,
    mode: ReadMode,
) -> Result<(), Error> {
    reader.ensure_current_node_is_start_element(namespace, local_name)?;
    property.read_attributes_from_xml(reader)?;

    if reader.is_empty_element() {
        reader.read()?;
        return reader.ensure_current_node_is_end_element(namespace, local_name);
    }

    loop {
        reader.read()?;

        match reader.node_type() {
            XmlNodeType::StartElement => {
                let handled = match mode {
                    ReadMode::Load => property.try_read_element_from_xml(reader)?,
                    ReadMode::Patch => property.try_read_element_from_xml_to_patch(reader)?,
                };

                if !handled {
                    log::debug!(
                        "skipping unrecognized element `{}` in `{}`",
                        reader.local_name(),
                        local_name
                    );
                    reader.skip_current_element()?;
                }
            }
            XmlNodeType::Text => property.read_text_value_from_xml(reader)?,
            XmlNodeType::EndOfDocument => return Err(Error::UnexpectedEndOfDocument),
            XmlNodeType::EndElement | XmlNodeType::None => {}
        }

        if reader.is_end_element(namespace, local_name) {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::test_utils::{assert_serialized_content, load_from_str};

    #[derive(Debug, Default)]
    struct Contact {
        core: PropertyCore,
        name: Option<String>,
        note: Option<String>,
        tags: u32,
    }

    impl ComplexProperty for Contact {
        fn core(&self) -> &PropertyCore {
            &self.core
        }

        fn read_attributes_from_xml(&mut self, reader: &EwsXmlReader<'_>) -> Result<(), Error> {
            self.tags = reader.read_attribute_value("Tags")?.unwrap_or_default();
            Ok(())
        }

        fn try_read_element_from_xml(&mut self, reader: &mut EwsXmlReader<'_>) -> Result<bool, Error> {
            match reader.local_name() {
                "Name" => self.name = Some(reader.read_element_value()?),
                _ => return Ok(false),
            }

            Ok(true)
        }

        fn try_read_element_from_xml_to_patch(
            &mut self,
            reader: &mut EwsXmlReader<'_>,
        ) -> Result<bool, Error> {
            self.try_read_element_from_xml(reader)
        }

        fn read_text_value_from_xml(&mut self, reader: &EwsXmlReader<'_>) -> Result<(), Error> {
            self.note = Some(reader.value().to_owned());
            Ok(())
        }

        fn write_attributes_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>) -> Result<(), Error> {
            writer.write_attribute_value("Tags", &self.tags)
        }

        fn write_elements_to_xml<W: Write>(&self, writer: &mut EwsXmlWriter<W>) -> Result<(), Error> {
            writer.write_optional_element_value(XmlNamespace::Types, "Name", self.name.as_ref())
        }
    }

    #[derive(Default)]
    struct Counter(Cell<usize>);

    impl ChangeListener for Counter {
        fn property_changed(&self) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn guard_detects_real_changes_only() {
        assert!(can_set_field_value(&None, &Some(1)));
        assert!(can_set_field_value(&Some(1), &None));
        assert!(can_set_field_value(&Some(1), &Some(2)));
        assert!(!can_set_field_value(&Some(1), &Some(1)));
        assert!(!can_set_field_value::<u32>(&None, &None));
    }

    #[test]
    fn setters_notify_listeners_on_change() {
        let counter = Rc::new(Counter::default());
        let mut contact = Contact::default();
        contact.core.notifier().subscribe(&counter);

        assert!(contact.core.set_field(&mut contact.name, Some("Ada".to_owned())));
        assert!(!contact.core.set_field(&mut contact.name, Some("Ada".to_owned())));
        assert!(contact.core.set_value(&mut contact.tags, 3));
        assert_eq!(counter.0.get(), 2);

        contact.core.set_field_unchecked(&mut contact.tags, 3);
        assert_eq!(counter.0.get(), 3);

        contact.core.notifier().unsubscribe(&counter);
        contact.changed();
        assert_eq!(counter.0.get(), 3);
    }

    #[test]
    fn dropped_listeners_are_not_kept_alive() {
        let contact = Contact::default();
        let counter = Rc::new(Counter::default());
        contact.core.notifier().subscribe(&counter);
        drop(counter);

        // Must not panic or resurrect the listener.
        contact.changed();
        assert_eq!(contact.core.notifier().listeners.borrow().len(), 0);
    }

    #[test]
    fn load_populates_without_flagging_changes() {
        let counter = Rc::new(Counter::default());
        let xml = r#"<t:Contact Tags="7"><t:Name>Ada</t:Name><t:Unknown><t:Nested/></t:Unknown>a note</t:Contact>"#;

        let contact: Contact = load_from_str(xml, "Contact");
        contact.core.notifier().subscribe(&counter);

        assert_eq!(contact.name.as_deref(), Some("Ada"));
        assert_eq!(contact.note.as_deref(), Some("a note"));
        assert_eq!(contact.tags, 7);
        assert_eq!(counter.0.get(), 0);
    }

    #[test]
    fn patching_leaves_untouched_fields_alone() {
        let mut contact: Contact = load_from_str(
            r#"<t:Contact Tags="1"><t:Name>Ada</t:Name></t:Contact>"#,
            "Contact",
        );

        let patch = br#"<t:Contact Tags="1"/>"#;
        let mut reader = EwsXmlReader::new(patch);
        reader.read().unwrap();
        contact.update_from_xml(&mut reader, "Contact").unwrap();

        assert_eq!(contact.name.as_deref(), Some("Ada"));
        assert!(reader.is_end_element(XmlNamespace::Types, "Contact"));
    }

    #[test]
    fn mismatched_root_is_fatal() {
        let mut contact = Contact::default();
        let mut reader = EwsXmlReader::new(b"<t:Mailbox/>");
        reader.read().unwrap();

        assert!(matches!(
            contact.load_from_xml(&mut reader, "Contact"),
            Err(Error::UnexpectedElement { .. })
        ));
    }

    #[test]
    fn truncated_documents_are_fatal() {
        let mut contact = Contact::default();
        let mut reader = EwsXmlReader::new(b"<t:Contact><t:Name>Ada</t:Name>");
        reader.read().unwrap();

        assert!(contact.load_from_xml(&mut reader, "Contact").is_err());
    }

    #[test]
    fn write_round_trips_through_load() {
        let contact: Contact = load_from_str(
            r#"<t:Contact Tags="2"><t:Name>Ada</t:Name></t:Contact>"#,
            "Contact",
        );

        assert_serialized_content(
            &contact,
            "Contact",
            r#"<t:Contact Tags="2"><t:Name>Ada</t:Name></t:Contact>"#,
        );
    }

    #[test]
    fn namespace_can_be_reassigned() {
        let contact = Contact::default();
        contact.core.set_namespace(XmlNamespace::Messages);

        assert_serialized_content(&contact, "Contact", r#"<m:Contact Tags="0"/>"#);
    }
}
