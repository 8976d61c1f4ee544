//! Minimal SOAP 1.1 codec for the directory service.
//!
//! Requests are written with an unqualified parameter per argument. Responses
//! are parsed into a namespace-stripped element tree, and SOAP-encoded
//! multi-references are inlined before the payload is handed out.

use std::collections::HashMap;

use quick_xml::{
    Reader, Writer,
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};

use crate::base::types::Res;

use super::DirectoryError;

pub const SOAP_ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// Guard against reference cycles when inlining `href`s.
const MAX_REFERENCE_DEPTH: usize = 32;

// Types.

/// An XML element with namespace prefixes stripped from its name and attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Text of a non-nil child element.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).filter(|c| !c.is_nil()).map(|c| c.text.as_str())
    }

    /// Whether the element is marked `xsi:nil`.
    pub fn is_nil(&self) -> bool {
        matches!(self.attribute("nil"), Some("true") | Some("1"))
    }

    /// Whether the element wraps a SOAP-encoded array rather than being an item itself.
    fn is_array_wrapper(&self) -> bool {
        self.attribute("arrayType").is_some() || (self.children.is_empty() && self.text.is_empty()) || (!self.children.is_empty() && self.children.iter().all(|c| c.name == "item"))
    }
}

/// The `<operation>Return` elements of a successful call.
#[derive(Debug, Clone)]
pub struct SoapResponse {
    pub operation: String,
    pub returns: Vec<XmlNode>,
}

impl SoapResponse {
    /// The single record a lookup returns.
    pub fn into_record(self) -> Result<XmlNode, DirectoryError> {
        match self.returns.into_iter().next() {
            Some(node) if !node.is_nil() => Ok(node),
            _ => Err(DirectoryError::NoResult { operation: self.operation }),
        }
    }

    /// The items of a collection; an empty collection is a valid answer.
    pub fn into_items(self) -> Result<Vec<XmlNode>, DirectoryError> {
        if self.returns.iter().any(XmlNode::is_nil) {
            return Err(DirectoryError::NoResult { operation: self.operation });
        }

        let mut returns = self.returns;

        if returns.len() == 1 && returns[0].is_array_wrapper() {
            return Ok(returns.remove(0).children);
        }

        Ok(returns)
    }
}

/// What the WSDL document tells us about the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsdlInfo {
    pub target_namespace: String,
    pub endpoint: String,
    pub operations: Vec<String>,
}

// Requests.

/// Build a request envelope for `operation` with the given parameters.
pub fn build_envelope(namespace: &str, operation: &str, params: &[(&str, String)]) -> Res<String> {
    let mut writer = Writer::new(Vec::new());

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut envelope = BytesStart::new("soapenv:Envelope");
    envelope.push_attribute(("xmlns:soapenv", SOAP_ENVELOPE_NS));
    envelope.push_attribute(("xmlns:tns", namespace));
    writer.write_event(Event::Start(envelope))?;
    writer.write_event(Event::Start(BytesStart::new("soapenv:Body")))?;

    let call = format!("tns:{operation}");
    writer.write_event(Event::Start(BytesStart::new(call.as_str())))?;

    for (name, value) in params {
        writer.write_event(Event::Start(BytesStart::new(*name)))?;
        writer.write_event(Event::Text(BytesText::new(value)))?;
        writer.write_event(Event::End(BytesEnd::new(*name)))?;
    }

    writer.write_event(Event::End(BytesEnd::new(call.as_str())))?;
    writer.write_event(Event::End(BytesEnd::new("soapenv:Body")))?;
    writer.write_event(Event::End(BytesEnd::new("soapenv:Envelope")))?;

    Ok(String::from_utf8(writer.into_inner())?)
}

// Responses.

/// Parse a response envelope and pull out the `<operation>Return` payload.
pub fn parse_response(xml: &str, operation: &str) -> Result<SoapResponse, DirectoryError> {
    let malformed = |reason: String| DirectoryError::Malformed {
        operation: operation.to_string(),
        reason,
    };

    let root = parse_document(xml).map_err(|e| malformed(e.to_string()))?;

    if root.name != "Envelope" {
        return Err(malformed(format!("expected `Envelope`, found `{}`", root.name)));
    }

    let body = root.child("Body").ok_or_else(|| malformed("missing `Body`".to_string()))?;

    if let Some(fault) = body.child("Fault") {
        return Err(DirectoryError::Fault {
            operation: operation.to_string(),
            code: fault.child_text("faultcode").unwrap_or_default().to_string(),
            message: fault.child_text("faultstring").unwrap_or_default().to_string(),
        });
    }

    let response_name = format!("{operation}Response");
    let Some(response) = body.child(&response_name) else {
        return Err(DirectoryError::NoResult { operation: operation.to_string() });
    };

    let references: HashMap<&str, &XmlNode> = body.children.iter().filter_map(|c| c.attribute("id").map(|id| (id, c))).collect();
    let response = resolve_references(response, &references, 0).map_err(malformed)?;

    let return_name = format!("{operation}Return");
    let returns = response.children_named(&return_name).cloned().collect();

    Ok(SoapResponse {
        operation: operation.to_string(),
        returns,
    })
}

/// Read the namespace, endpoint, and operation names out of a WSDL document.
pub fn parse_wsdl(xml: &str) -> Res<WsdlInfo> {
    let root = parse_document(xml)?;

    if root.name != "definitions" {
        return Err(anyhow::anyhow!("Expected WSDL `definitions`, found `{}`.", root.name));
    }

    let target_namespace = root.attribute("targetNamespace").ok_or_else(|| anyhow::anyhow!("WSDL has no target namespace."))?.to_string();

    let endpoint = root
        .children_named("service")
        .flat_map(|s| s.children_named("port"))
        .flat_map(|p| p.children_named("address"))
        .find_map(|a| a.attribute("location"))
        .ok_or_else(|| anyhow::anyhow!("WSDL has no SOAP address."))?
        .to_string();

    let mut operations: Vec<String> = Vec::new();
    for operation in root.children_named("portType").flat_map(|p| p.children_named("operation")) {
        if let Some(name) = operation.attribute("name")
            && !operations.iter().any(|o| o == name)
        {
            operations.push(name.to_string());
        }
    }

    Ok(WsdlInfo {
        target_namespace,
        endpoint,
        operations,
    })
}

// Helpers.

/// Parse a document into its root element.
pub fn parse_document(xml: &str) -> Res<XmlNode> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => stack.push(node_from_start(&start)?),
            Event::Empty(start) => {
                let node = node_from_start(&start)?;
                attach(&mut stack, &mut root, node);
            }
            Event::End(_) => {
                if let Some(node) = stack.pop() {
                    attach(&mut stack, &mut root, node);
                }
            }
            Event::Text(text) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text.unescape()?);
                }
            }
            Event::CData(data) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    root.ok_or_else(|| anyhow::anyhow!("Document has no root element."))
}

fn node_from_start(start: &BytesStart<'_>) -> Result<XmlNode, quick_xml::Error> {
    let mut attributes = Vec::new();

    for attribute in start.attributes() {
        let attribute = attribute?;

        if attribute.key.as_namespace_binding().is_some() {
            continue;
        }

        let key = String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned();
        let value = attribute.unescape_value()?.into_owned();
        attributes.push((key, value));
    }

    Ok(XmlNode {
        name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
        attributes,
        ..Default::default()
    })
}

fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => {
            root.get_or_insert(node);
        }
    }
}

/// Inline every `href="#id"` with the referenced element, keeping the referring element's name.
fn resolve_references(node: &XmlNode, references: &HashMap<&str, &XmlNode>, depth: usize) -> Result<XmlNode, String> {
    if depth > MAX_REFERENCE_DEPTH {
        return Err("reference nesting too deep".to_string());
    }

    let source = match node.attribute("href").and_then(|h| h.strip_prefix('#')) {
        Some(id) => *references.get(id).ok_or_else(|| format!("dangling reference `#{id}`"))?,
        None => node,
    };

    let children = source.children.iter().map(|c| resolve_references(c, references, depth + 1)).collect::<Result<Vec<_>, _>>()?;

    Ok(XmlNode {
        name: node.name.clone(),
        attributes: source.attributes.clone(),
        text: source.text.clone(),
        children,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:soapenc="http://schemas.xmlsoap.org/soap/encoding/">
  <soapenv:Body>{body}</soapenv:Body>
</soapenv:Envelope>"#
        )
    }

    #[test]
    fn test_build_envelope_escapes_parameters() {
        let xml = build_envelope("urn:moira", "getUserLists", &[("userName", "a<b&c".to_string())]).unwrap();

        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(xml.contains(r#"xmlns:tns="urn:moira""#));
        assert!(xml.contains("<tns:getUserLists><userName>a&lt;b&amp;c</userName></tns:getUserLists>"));

        let root = parse_document(&xml).unwrap();
        let call = root.child("Body").and_then(|b| b.child("getUserLists")).unwrap();
        assert_eq!(call.child_text("userName"), Some("a<b&c"));
    }

    #[test]
    fn test_parse_record() {
        let xml = envelope(
            r#"<ns1:getUserAttributesResponse xmlns:ns1="urn:moira">
                 <getUserAttributesReturn><firstName>Jane</firstName><lastName>Doe</lastName></getUserAttributesReturn>
               </ns1:getUserAttributesResponse>"#,
        );

        let record = parse_response(&xml, "getUserAttributes").unwrap().into_record().unwrap();
        assert_eq!(record.child_text("firstName"), Some("Jane"));
        assert_eq!(record.child_text("lastName"), Some("Doe"));
    }

    #[test]
    fn test_parse_nil_record_is_no_result() {
        let xml = envelope(r#"<ns1:getListAttributesResponse xmlns:ns1="urn:moira"><getListAttributesReturn xsi:nil="true"/></ns1:getListAttributesResponse>"#);

        let err = parse_response(&xml, "getListAttributes").unwrap().into_record().unwrap_err();
        assert!(matches!(err, DirectoryError::NoResult { .. }));
    }

    #[test]
    fn test_parse_absent_response_is_no_result() {
        let xml = envelope("");

        let err = parse_response(&xml, "getUserLists").unwrap_err();
        assert!(matches!(err, DirectoryError::NoResult { .. }));
    }

    #[test]
    fn test_parse_nil_collection_is_no_result() {
        let xml = envelope(r#"<ns1:getUserListsResponse xmlns:ns1="urn:moira"><getUserListsReturn xsi:nil="1"/></ns1:getUserListsResponse>"#);

        let err = parse_response(&xml, "getUserLists").unwrap().into_items().unwrap_err();
        assert!(matches!(err, DirectoryError::NoResult { .. }));
    }

    #[test]
    fn test_parse_empty_collection() {
        let encoded = envelope(r#"<ns1:getUserListsResponse xmlns:ns1="urn:moira"><getUserListsReturn soapenc:arrayType="xsd:string[0]"/></ns1:getUserListsResponse>"#);
        assert!(parse_response(&encoded, "getUserLists").unwrap().into_items().unwrap().is_empty());

        let literal = envelope(r#"<ns1:getUserListsResponse xmlns:ns1="urn:moira"/>"#);
        assert!(parse_response(&literal, "getUserLists").unwrap().into_items().unwrap().is_empty());
    }

    #[test]
    fn test_parse_repeated_returns() {
        let xml = envelope(
            r#"<ns1:getUserListsResponse xmlns:ns1="urn:moira">
                 <getUserListsReturn>sipb</getUserListsReturn>
                 <getUserListsReturn>canvas-2023-6.004</getUserListsReturn>
               </ns1:getUserListsResponse>"#,
        );

        let items = parse_response(&xml, "getUserLists").unwrap().into_items().unwrap();
        let names: Vec<_> = items.iter().map(|i| i.text.as_str()).collect();
        assert_eq!(names, vec!["sipb", "canvas-2023-6.004"]);
    }

    #[test]
    fn test_parse_single_literal_record_item() {
        let xml = envelope(
            r#"<ns1:getListMembershipResponse xmlns:ns1="urn:moira">
                 <getListMembershipReturn><listName>sipb</listName><member>abc</member><type>USER</type></getListMembershipReturn>
               </ns1:getListMembershipResponse>"#,
        );

        let items = parse_response(&xml, "getListMembership").unwrap().into_items().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].child_text("member"), Some("abc"));
    }

    #[test]
    fn test_parse_resolves_multi_references() {
        let xml = envelope(
            r##"<ns1:getListMembershipResponse xmlns:ns1="urn:moira">
                 <getListMembershipReturn soapenc:arrayType="ns1:ListMember[2]">
                   <item href="#id0"/>
                   <item href="#id1"/>
                 </getListMembershipReturn>
               </ns1:getListMembershipResponse>
               <multiRef id="id0"><listName>sipb</listName><member>abc</member><type>USER</type></multiRef>
               <multiRef id="id1"><listName>sipb</listName><member>xyz/root@ATHENA.MIT.EDU</member><type>KERBEROS</type></multiRef>"##,
        );

        let items = parse_response(&xml, "getListMembership").unwrap().into_items().unwrap();
        let members: Vec<_> = items.iter().filter_map(|i| i.child_text("member")).collect();
        assert_eq!(members, vec!["abc", "xyz/root@ATHENA.MIT.EDU"]);
        assert!(items.iter().all(|i| i.name == "item"));
    }

    #[test]
    fn test_parse_dangling_reference_is_malformed() {
        let xml = envelope(r##"<ns1:getUserListsResponse xmlns:ns1="urn:moira"><getUserListsReturn href="#missing"/></ns1:getUserListsResponse>"##);

        let err = parse_response(&xml, "getUserLists").unwrap_err();
        assert!(matches!(err, DirectoryError::Malformed { .. }));
    }

    #[test]
    fn test_parse_fault() {
        let xml = envelope(
            r#"<soapenv:Fault>
                 <faultcode>soapenv:Server.userException</faultcode>
                 <faultstring>No such list</faultstring>
               </soapenv:Fault>"#,
        );

        match parse_response(&xml, "getListAttributes").unwrap_err() {
            DirectoryError::Fault { code, message, .. } => {
                assert_eq!(code, "soapenv:Server.userException");
                assert_eq!(message, "No such list");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_garbage_is_malformed() {
        assert!(matches!(parse_response("<html>oops</html>", "getUserLists").unwrap_err(), DirectoryError::Malformed { .. }));
        assert!(matches!(parse_response("not xml at all", "getUserLists").unwrap_err(), DirectoryError::Malformed { .. }));
    }

    #[test]
    fn test_parse_wsdl() {
        let wsdl = r#"<?xml version="1.0" encoding="UTF-8"?>
<wsdl:definitions targetNamespace="urn:moira" xmlns:wsdl="http://schemas.xmlsoap.org/wsdl/" xmlns:wsdlsoap="http://schemas.xmlsoap.org/wsdl/soap/">
  <wsdl:portType name="Moira">
    <wsdl:operation name="getListMembership"/>
    <wsdl:operation name="getUserLists"/>
  </wsdl:portType>
  <wsdl:binding name="MoiraSoapBinding" type="impl:Moira">
    <wsdl:operation name="getListMembership"/>
  </wsdl:binding>
  <wsdl:service name="MoiraService">
    <wsdl:port binding="impl:MoiraSoapBinding" name="moira">
      <wsdlsoap:address location="https://moiraws.example.org/moiraws/services/moira"/>
    </wsdl:port>
  </wsdl:service>
</wsdl:definitions>"#;

        let info = parse_wsdl(wsdl).unwrap();
        assert_eq!(info.target_namespace, "urn:moira");
        assert_eq!(info.endpoint, "https://moiraws.example.org/moiraws/services/moira");
        assert_eq!(info.operations, vec!["getListMembership", "getUserLists"]);
    }
}
